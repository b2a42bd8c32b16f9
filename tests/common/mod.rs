#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use quarry::{
    Database, DatabaseConfig, EnumStorage, MappingOptions, MigrationContext, Migrations, Record,
    ReferentialAction, Schema, SchemaBuilder, SqlEnum, TableBuilder, TypeRegistry,
};
use uuid::Uuid;

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

impl Record for Author {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.column("Id", |r| &r.id, |r, v| r.id = v);
        t.column("Name", |r| &r.name, |r, v| r.name = v).max_length(120);
        t.nullable("Email", |r| &r.email, |r, v| r.email = v).unique();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Status {
    #[default]
    Draft,
    Published,
}

impl SqlEnum for Status {
    const VARIANTS: &'static [Self] = &[Status::Draft, Status::Published];

    fn label(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Published => "published",
        }
    }

    fn discriminant(self) -> i64 {
        match self {
            Status::Draft => 0,
            Status::Published => 1,
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub author_id: Uuid,
    pub title: String,
    pub status: Status,
    pub tag_ids: Vec<i64>,
    pub word_count: usize,
}

impl Record for Article {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.column("Id", |r| &r.id, |r, v| r.id = v);
        t.column("AuthorId", |r| &r.author_id, |r, v| r.author_id = v)
            .references::<Author>()
            .on_cascade(ReferentialAction::Cascade)
            .indexed();
        t.column("Title", |r| &r.title, |r, v| r.title = v);
        t.column("Status", |r| &r.status, |r, v| r.status = v);
        t.many_to_many("Tags", |r| &r.tag_ids, |r, v| r.tag_ids = v)
            .target::<Tag>()
            .through::<ArticleTag>()
            .ordered_by("Position");
        t.column("WordCount", |r| &r.word_count, |r, v| r.word_count = v)
            .ignore();
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Record for Tag {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.column("Id", |r| &r.id, |r, v| r.id = v);
        t.column("Label", |r| &r.label, |r, v| r.label = v).unique();
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ArticleTag {
    pub id: i64,
    pub article_id: i64,
    pub tag_id: i64,
    pub position: i32,
}

impl Record for ArticleTag {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.column("Id", |r| &r.id, |r, v| r.id = v);
        t.column("ArticleId", |r| &r.article_id, |r, v| r.article_id = v)
            .references::<Article>()
            .on_cascade(ReferentialAction::Cascade);
        t.column("TagId", |r| &r.tag_id, |r, v| r.tag_id = v)
            .references::<Tag>()
            .on_cascade(ReferentialAction::Cascade);
        t.column("Position", |r| &r.position, |r, v| r.position = v);
    }
}

/// Second revision of `Tag`: same table, one more column.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct TagV2 {
    pub id: i64,
    pub label: String,
    pub color: String,
}

impl Record for TagV2 {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.name("Tag");
        t.column("Id", |r| &r.id, |r, v| r.id = v);
        t.column("Label", |r| &r.label, |r, v| r.label = v).unique();
        t.column("Color", |r| &r.color, |r, v| r.color = v).default_value("grey");
    }
}

/// A table without a primary key.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Record for Setting {
    fn describe(t: &mut TableBuilder<'_, Self>) {
        t.column("Key", |r| &r.key, |r, v| r.key = v);
        t.column("Value", |r| &r.value, |r, v| r.value = v);
    }
}

pub fn blog_builder() -> SchemaBuilder {
    let mut builder = SchemaBuilder::new(TypeRegistry::new(), MappingOptions::default());
    builder
        .registry_mut()
        .register_enum::<Status>(EnumStorage::Text);
    builder
        .register::<Author>()
        .unwrap()
        .register::<Article>()
        .unwrap()
        .register::<Tag>()
        .unwrap()
        .register::<ArticleTag>()
        .unwrap()
        .register::<Setting>()
        .unwrap();
    builder
}

pub fn blog_schema() -> Arc<Schema> {
    Arc::new(blog_builder().build().unwrap())
}

pub fn config(target_version: u32) -> DatabaseConfig {
    let mut config = DatabaseConfig::default();
    config.migrations.target_version = target_version;
    config
}

pub fn no_migrations(config: &DatabaseConfig) -> Migrations<MigrationContext> {
    config.migrations.migrations()
}

pub fn open_blog() -> Database {
    let config = config(1);
    Database::open_in_memory(blog_schema(), &no_migrations(&config), &config).unwrap()
}

pub fn open_file(
    path: &Path,
    schema: Arc<Schema>,
    migrations: &Migrations<MigrationContext>,
    config: &DatabaseConfig,
) -> quarry::Result<Database> {
    Database::open(path, schema, migrations, config)
}

pub fn schema_of<T: Record>() -> Arc<Schema> {
    let mut builder = SchemaBuilder::default();
    builder.register::<T>().unwrap();
    Arc::new(builder.build().unwrap())
}

pub fn new_author(db: &Database, name: &str) -> Author {
    let mut author = Author {
        name: name.to_string(),
        ..Author::default()
    };
    db.insert(&mut author).unwrap();
    author
}

pub fn new_tag(db: &Database, label: &str) -> Tag {
    let mut tag = Tag {
        label: label.to_string(),
        ..Tag::default()
    };
    db.insert(&mut tag).unwrap();
    tag
}

pub fn count_rows(db: &Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .unwrap()
}
