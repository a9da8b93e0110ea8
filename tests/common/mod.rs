#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Mutex;

use mongogate::prelude::*;
use mongogate::{Stage, pipeline_to_value};
use serde_json::{Value, json};

/// Users reference one role and many posts; posts reference one category and
/// many tags; roles reference many permissions.
pub fn schema() -> Registry {
    Registry::new()
        .entity(
            Entity::new("User")
                .field("name")
                .field("email")
                .field("age")
                .field("isActive")
                .field("createdAt")
                .one("role", "Role")
                .many("posts", "Post"),
        )
        .entity(Entity::new("Role").field("name").many("permissions", "Permission"))
        .entity(Entity::new("Permission").field("name"))
        .entity(
            Entity::new("Post")
                .field("title")
                .one("category", "Category")
                .many("tags", "Tag"),
        )
        .entity(Entity::new("Category").field("name"))
        .entity(Entity::new("Tag").field("name"))
        .entity(Entity::new("Product").field("name").field("price").field("stock"))
}

pub fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .insert_many(
            "users",
            [
                json!({ "_id": "u1", "name": "Alice", "email": "alice@example.com", "age": 30, "isActive": true,
                        "role": "r1", "posts": ["p1", "p2"], "createdAt": "2024-01-03" }),
                json!({ "_id": "u2", "name": "Bob", "email": "bob@example.com", "age": 25, "isActive": true,
                        "role": "r2", "posts": ["p3"], "createdAt": "2024-01-01" }),
                json!({ "_id": "u3", "name": "Charlie", "email": "charlie@example.com", "age": 35, "isActive": false,
                        "role": "r2", "posts": [], "createdAt": "2024-01-02" }),
                json!({ "_id": "u4", "name": "David", "email": "david@example.com", "age": 40, "isActive": true,
                        "createdAt": "2024-01-04" }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "roles",
            [
                json!({ "_id": "r1", "name": "Admin", "permissions": ["perm1", "perm2"] }),
                json!({ "_id": "r2", "name": "User", "permissions": ["perm1"] }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "permissions",
            [
                json!({ "_id": "perm1", "name": "read" }),
                json!({ "_id": "perm2", "name": "write" }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "posts",
            [
                json!({ "_id": "p1", "title": "First", "category": "c1", "tags": ["t1", "t2"] }),
                json!({ "_id": "p2", "title": "Second", "category": "c2", "tags": [] }),
                json!({ "_id": "p3", "title": "Third", "category": "c404" }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "categories",
            [
                json!({ "_id": "c1", "name": "Tech" }),
                json!({ "_id": "c2", "name": "Life" }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "tags",
            [
                json!({ "_id": "t1", "name": "rust" }),
                json!({ "_id": "t2", "name": "db" }),
            ],
        )
        .unwrap();
    store
        .insert_many(
            "products",
            [
                json!({ "_id": "prod1", "name": "Laptop", "price": 1200, "stock": 10 }),
                json!({ "_id": "prod2", "name": "Phone", "price": 800, "stock": 5 }),
                json!({ "_id": "prod3", "name": "Monitor", "price": 2500, "stock": 2 }),
            ],
        )
        .unwrap();
    store
}

pub fn db() -> Mongogate<Registry, MemoryStore> {
    Mongogate::new(schema(), store())
}

/// String values of `field` across `rows`, in order.
pub fn column<'a>(rows: &'a [Document], field: &str) -> Vec<&'a str> {
    rows.iter()
        .map(|row| row.get(field).and_then(Value::as_str).unwrap_or(""))
        .collect()
}

/// Executor that records every pipeline it receives and answers with canned
/// rows.
#[derive(Debug, Default)]
pub struct Recorder {
    calls: Mutex<Vec<(String, Value)>>,
    rows: Vec<Document>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(rows: Value) -> Self {
        let rows = match rows {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Self {
            calls: Mutex::new(Vec::new()),
            rows,
        }
    }

    /// `(collection, rendered pipeline)` for every call so far.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_pipeline(&self) -> Value {
        self.calls().last().map(|(_, p)| p.clone()).unwrap_or(Value::Null)
    }
}

impl Executor for Recorder {
    type Error = Infallible;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
    ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send {
        self.calls
            .lock()
            .unwrap()
            .push((collection.to_owned(), pipeline_to_value(pipeline)));
        std::future::ready(Ok(self.rows.clone()))
    }
}
