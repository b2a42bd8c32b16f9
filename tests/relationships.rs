mod common;

use common::*;
use quarry::Database;

fn article_with_tags(db: &Database, tags: &[&Tag]) -> Article {
    let author = new_author(db, "Ada");
    let mut article = Article {
        author_id: author.id,
        title: "Tagged".into(),
        ..Article::default()
    };
    db.insert(&mut article).unwrap();
    article.tag_ids = tags.iter().map(|t| t.id).collect();
    db.update(&article).unwrap();
    article
}

fn stored_tags(db: &Database, id: i64) -> Vec<i64> {
    let mut article: Article = db.get(&id).unwrap();
    assert!(article.tag_ids.is_empty());
    db.read_relationships(&mut article).unwrap();
    article.tag_ids
}

#[test]
fn identifiers_round_trip_in_order() {
    let db = open_blog();
    let rust = new_tag(&db, "rust");
    let sql = new_tag(&db, "sql");
    let orm = new_tag(&db, "orm");
    let article = article_with_tags(&db, &[&orm, &rust, &sql]);

    assert_eq!(stored_tags(&db, article.id), [orm.id, rust.id, sql.id]);
    assert_eq!(count_rows(&db, "ArticleTag"), 3);
}

#[test]
fn rewriting_replaces_previous_rows() {
    let db = open_blog();
    let (a, b, c) = (new_tag(&db, "a"), new_tag(&db, "b"), new_tag(&db, "c"));
    let mut article = article_with_tags(&db, &[&a, &b, &c]);

    article.tag_ids = vec![c.id, a.id];
    db.write_relationships(&article).unwrap();
    assert_eq!(stored_tags(&db, article.id), [c.id, a.id]);
    assert_eq!(count_rows(&db, "ArticleTag"), 2);

    article.tag_ids.clear();
    db.update(&article).unwrap();
    assert!(stored_tags(&db, article.id).is_empty());
    assert_eq!(count_rows(&db, "ArticleTag"), 0);
}

#[test]
fn owners_do_not_share_rows() {
    let db = open_blog();
    let (a, b) = (new_tag(&db, "a"), new_tag(&db, "b"));
    let first = article_with_tags(&db, &[&a]);
    let second = article_with_tags(&db, &[&b, &a]);

    assert_eq!(stored_tags(&db, first.id), [a.id]);
    assert_eq!(stored_tags(&db, second.id), [b.id, a.id]);
}

#[test]
fn insert_alone_does_not_write_junction_rows() {
    let db = open_blog();
    let tag = new_tag(&db, "solo");
    let author = new_author(&db, "Ada");
    let mut article = Article {
        author_id: author.id,
        title: "Untagged".into(),
        tag_ids: vec![tag.id],
        ..Article::default()
    };
    db.insert(&mut article).unwrap();
    assert_eq!(count_rows(&db, "ArticleTag"), 0);
}

#[test]
fn unknown_target_identifier_is_a_constraint_violation() {
    let db = open_blog();
    let tag = new_tag(&db, "real");
    let mut article = article_with_tags(&db, &[&tag]);

    article.tag_ids = vec![tag.id, tag.id + 100];
    let err = db.update(&article).unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");
    // The failed update leaves the previous rows in place.
    assert_eq!(stored_tags(&db, article.id), [tag.id]);
}

#[test]
fn deleting_a_target_cascades_to_junction_rows() {
    let db = open_blog();
    let (a, b) = (new_tag(&db, "a"), new_tag(&db, "b"));
    let article = article_with_tags(&db, &[&a, &b]);

    db.delete(&a).unwrap();
    assert_eq!(stored_tags(&db, article.id), [b.id]);
}

#[test]
fn reversed_order_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");
    let config = config(1);
    let migrations = no_migrations(&config);

    let (article_id, expected) = {
        let db = open_file(&path, blog_schema(), &migrations, &config).unwrap();
        let (a, b, c) = (new_tag(&db, "a"), new_tag(&db, "b"), new_tag(&db, "c"));
        let mut article = article_with_tags(&db, &[&a, &b, &c]);
        assert_eq!(stored_tags(&db, article.id), [a.id, b.id, c.id]);

        article.tag_ids.reverse();
        db.update(&article).unwrap();
        (article.id, vec![c.id, b.id, a.id])
    };

    let db = open_file(&path, blog_schema(), &migrations, &config).unwrap();
    assert_eq!(db.schema_version().unwrap(), 1);
    assert_eq!(stored_tags(&db, article_id), expected);
}
