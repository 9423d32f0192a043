//! Shared fixtures for end-to-end tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use docbridge_adapters::remote::CacheConnection;
use docbridge_adapters::storage::{InMemoryCache, InMemoryConnection};
use docbridge_common::types::{ColumnType, Value};
use docbridge_core::document::ProtoWriter;
use docbridge_core::execution::Row;
use docbridge_core::schema::{Column, Schema, Table};
use docbridge_engine::{Config, Connector};

pub const PERSON: &str = "tutorial.Person";

/// A person document.
#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub notes: String,
    pub phones: Vec<(String, i32)>,
    pub city: Option<String>,
    pub tags: Vec<String>,
    pub visits: Option<u64>,
}

impl Person {
    pub fn new(id: i32, name: &str, age: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            age,
            notes: String::new(),
            ..Self::default()
        }
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    pub fn phone(mut self, number: &str, kind: i32) -> Self {
        self.phones.push((number.to_string(), kind));
        self
    }

    pub fn city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn visits(mut self, visits: u64) -> Self {
        self.visits = Some(visits);
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = ProtoWriter::new()
            .int32(1, self.id)
            .string(2, &self.name)
            .int32(3, self.age)
            .string(6, &self.notes);
        for (number, kind) in &self.phones {
            writer = writer.message(4, ProtoWriter::new().string(1, number).int32(2, *kind));
        }
        if let Some(city) = &self.city {
            writer = writer.message(5, ProtoWriter::new().string(1, city));
        }
        for tag in &self.tags {
            writer = writer.string(7, tag);
        }
        if let Some(visits) = self.visits {
            writer = writer.uint64(8, visits);
        }
        writer.finish()
    }
}

/// Person documents with phones, an address, tags, and a visit counter.
pub fn schema() -> Schema {
    Schema::new()
        .with_table(
            Table::root("Person", PERSON)
                .with_column(Column::new("id", 1, ColumnType::Int32))
                .with_column(Column::new("name", 2, ColumnType::String))
                .with_column(Column::new("age", 3, ColumnType::Int32))
                .with_column(Column::new("notes", 6, ColumnType::String).not_searchable())
                .with_column(Column::new("tags", 7, ColumnType::String).repeated())
                .with_column(Column::new("visits", 8, ColumnType::UInt64)),
        )
        .with_table(
            Table::nested("Phone", "tutorial.PhoneNumber", "Person", "phones", 4, true)
                .with_column(Column::new("number", 1, ColumnType::String))
                .with_column(Column::new("kind", 2, ColumnType::Enum)),
        )
        .with_table(
            Table::nested("Address", "tutorial.Address", "Person", "address", 5, false)
                .with_column(Column::new("city", 1, ColumnType::String)),
        )
}

/// An in-memory store holding `people` in its default cache.
pub struct Fixture {
    pub connection: Arc<InMemoryConnection>,
    pub cache: Arc<InMemoryCache>,
    pub connector: Connector,
}

impl Fixture {
    pub fn new(people: &[Person]) -> Self {
        Self::with_config(people, Config::default())
    }

    pub fn with_config(people: &[Person], config: Config) -> Self {
        let schema = schema();
        let connection = Arc::new(InMemoryConnection::new("default"));
        connection
            .define_document(&schema, "Person")
            .expect("person document is valid");
        let cache = connection.default_cache();
        cache.insert_all(PERSON, people.iter().map(Person::encode));
        let connector = Connector::new(
            config,
            Arc::clone(&connection) as Arc<dyn CacheConnection>,
            Arc::new(schema),
        );
        Self {
            connection,
            cache,
            connector,
        }
    }
}

pub fn int(row: &Row, index: usize) -> i64 {
    row.values()[index]
        .as_int64()
        .expect("integer column")
}

pub fn text(row: &Row, index: usize) -> Option<String> {
    row.values()[index].as_str().map(str::to_string)
}

pub fn s(text: &str) -> Value {
    Value::from(text)
}
