mod common;

use common::*;
use quarry::{QuarryError, Value};
use rand::Rng;
use uuid::Uuid;

fn random_name(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn new_article(db: &quarry::Database, author: &Author, title: &str) -> Article {
    let mut article = Article {
        author_id: author.id,
        title: title.to_string(),
        ..Article::default()
    };
    db.insert(&mut article).unwrap();
    article
}

#[test]
fn insert_assigns_counter_and_get_reads_back() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    let first = new_article(&db, &author, "Engines");
    let second = new_article(&db, &author, "Looms");

    assert!(first.id > 0);
    assert_eq!(second.id, first.id + 1);

    let stored: Article = db.get(&second.id).unwrap();
    assert_eq!(stored.title, "Looms");
    assert_eq!(stored.author_id, author.id);
    assert_eq!(stored.status, Status::Draft);
}

#[test]
fn generated_identities_are_unique() {
    let db = open_blog();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..50 {
        let author = new_author(&db, &random_name(16));
        assert!(!author.id.is_nil());
        assert!(seen.insert(author.id));
    }
    assert_eq!(count_rows(&db, "Author"), 50);
}

#[test]
fn preassigned_identity_is_kept() {
    let db = open_blog();
    let id = Uuid::new_v4();
    let mut author = Author {
        id,
        name: "Grace".into(),
        email: Some("grace@example.com".into()),
    };
    db.insert(&mut author).unwrap();
    assert_eq!(author.id, id);
    assert_eq!(db.get::<Author, _>(&id).unwrap(), author);
}

#[test]
fn update_and_delete_by_key() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    let mut article = new_article(&db, &author, "Draft title");

    article.title = "Final title".into();
    article.status = Status::Published;
    assert_eq!(db.update(&article).unwrap(), 1);
    let stored: Article = db.get(&article.id).unwrap();
    assert_eq!(stored.title, "Final title");
    assert_eq!(stored.status, Status::Published);

    assert_eq!(db.delete(&stored).unwrap(), 1);
    assert!(db.find::<Article, _>(&article.id).unwrap().is_none());
    assert_eq!(db.delete_by_key::<Article, _>(&article.id).unwrap(), 0);
}

#[test]
fn missing_row_is_not_found() {
    let db = open_blog();
    let err = db.get::<Article, _>(&42i64).unwrap_err();
    assert!(matches!(err, QuarryError::NotFound));
}

#[test]
fn enum_is_stored_by_label() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    let mut article = Article {
        author_id: author.id,
        title: "Published".into(),
        status: Status::Published,
        ..Article::default()
    };
    db.insert(&mut article).unwrap();

    let raw: String = db
        .connection()
        .query_row("SELECT \"Status\" FROM \"Article\" WHERE \"Id\" = ?1", [article.id], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(raw, "published");

    // Rows written before the enum was stored by label hold its discriminant.
    db.connection()
        .execute("UPDATE \"Article\" SET \"Status\" = 0 WHERE \"Id\" = ?1", [article.id])
        .unwrap();
    assert_eq!(
        db.get::<Article,
        _>(&article.id).unwrap().status,
        Status::Draft
    );
}

#[test]
fn invalid_utf8_text_is_a_conversion_error() {
    let db = open_blog();
    let tag = new_tag(&db, "plain");
    db.connection()
        .execute(
            "UPDATE \"Tag\" SET \"Label\" = CAST(x'66ff' AS TEXT) WHERE \"Id\" = ?1",
            [tag.id],
        )
        .unwrap();
    let err = db.get::<Tag, _>(&tag.id).unwrap_err();
    assert!(matches!(err, QuarryError::Conversion(_)), "{err}");
}

#[test]
fn ignored_fields_are_not_persisted() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    let mut article = Article {
        author_id: author.id,
        title: "Counted".into(),
        word_count: 1200,
        ..Article::default()
    };
    db.insert(&mut article).unwrap();
    assert_eq!(db.get::<Article, _>(&article.id).unwrap().word_count, 0);
}

#[test]
fn unique_and_foreign_key_violations_are_reported() {
    let db = open_blog();
    let mut first = Author {
        name: "One".into(),
        email: Some("shared@example.com".into()),
        ..Author::default()
    };
    db.insert(&mut first).unwrap();
    let mut second = Author {
        name: "Two".into(),
        email: Some("shared@example.com".into()),
        ..Author::default()
    };
    let err = db.insert(&mut second).unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");

    let mut orphan = Article {
        author_id: Uuid::new_v4(),
        title: "Orphan".into(),
        ..Article::default()
    };
    let err = db.insert(&mut orphan).unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");
}

#[test]
fn null_optional_values_do_not_collide() {
    let db = open_blog();
    new_author(&db, "Anon one");
    new_author(&db, "Anon two");
    let authors: Vec<Author> = db.all().unwrap();
    assert_eq!(authors.len(), 2);
    assert!(authors.iter().all(|a| a.email.is_none()));
}

#[test]
fn deleting_owner_cascades() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    new_article(&db, &author, "One");
    new_article(&db, &author, "Two");
    assert_eq!(count_rows(&db, "Article"), 2);

    db.delete(&author).unwrap();
    assert_eq!(count_rows(&db, "Article"), 0);
}

#[test]
fn insert_all_is_atomic() {
    let db = open_blog();
    let mut tags = vec![
        Tag { label: "a".into(), ..Tag::default() },
        Tag { label: "b".into(), ..Tag::default() },
    ];
    assert_eq!(db.insert_all(&mut tags).unwrap(), 2);
    assert!(tags.iter().all(|t| t.id > 0));

    let mut clashing = vec![
        Tag { label: "c".into(), ..Tag::default() },
        Tag { label: "a".into(), ..Tag::default() },
    ];
    assert!(db.insert_all(&mut clashing).is_err());
    assert_eq!(count_rows(&db, "Tag"), 2);
}

#[test]
fn insert_or_replace_overwrites_by_key() {
    let db = open_blog();
    let tag = new_tag(&db, "old");
    let mut replacement = Tag {
        id: tag.id,
        label: "new".into(),
    };
    db.insert_or_replace(&mut replacement).unwrap();

    assert_eq!(count_rows(&db, "Tag"), 1);
    assert_eq!(db.get::<Tag, _>(&tag.id).unwrap().label, "new");
}

#[test]
fn keyless_table_reads_any_row_and_refuses_updates() {
    let db = open_blog();
    assert!(db.first::<Setting>().unwrap().is_none());

    let mut setting = Setting {
        key: "theme".into(),
        value: "dark".into(),
    };
    db.insert(&mut setting).unwrap();
    assert_eq!(db.first::<Setting>().unwrap(), Some(setting.clone()));
    // The key is ignored without a primary key.
    assert_eq!(
        db.find::<Setting,
        _>(&"anything".to_string()).unwrap(),
        Some(setting.clone())
    );

    let err = db.update(&setting).unwrap_err();
    assert!(matches!(err, QuarryError::Configuration(_)));
    assert!(matches!(
        db.delete(&setting),
        Err(QuarryError::Configuration(_))
    ));
}

#[test]
fn unregistered_record_type_is_rejected() {
    let db = open_blog();
    let mut tag = TagV2::default();
    let err = db.insert(&mut tag).unwrap_err();
    assert!(matches!(err, QuarryError::Configuration(_)));
}

#[test]
fn transaction_rolls_back_on_error() {
    let db = open_blog();
    let result: quarry::Result<()> = db.transaction(|conn| {
        conn.execute("INSERT INTO \"Tag\" (\"Label\") VALUES ('kept?')", [])?;
        Err(QuarryError::NotFound)
    });
    assert!(result.is_err());
    assert_eq!(count_rows(&db, "Tag"), 0);

    db.transaction(|conn| {
        conn.execute("INSERT INTO \"Tag\" (\"Label\") VALUES ('kept')", [])?;
        Ok(())
    })
    .unwrap();
    assert_eq!(count_rows(&db, "Tag"), 1);
}

#[test]
fn key_encoding_matches_stored_values() {
    let db = open_blog();
    let author = new_author(&db, "Ada");
    let key = db
        .schema()
        .registry()
        .resolve::<Uuid>()
        .unwrap()
        .encode(Some(&author.id))
        .unwrap();
    assert_eq!(key, Value::Text(author.id.to_string()));
}
