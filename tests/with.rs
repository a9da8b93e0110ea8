use mongogate::Stage;
use mongogate::prelude::*;
use serde_json::{Value, json};

mod common;
use common::{Recorder, db, schema};

fn by_name<'a>(rows: &'a [Document], name: &str) -> &'a Document {
    rows.iter()
        .find(|row| row.get("name").and_then(Value::as_str) == Some(name))
        .unwrap()
}

#[tokio::test]
async fn test_single_reference_is_unwound() {
    let db = db();
    let rows = db.query("User").with("role").unwrap().get().await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(by_name(&rows, "Alice")["role"]["name"], json!("Admin"));
    assert_eq!(by_name(&rows, "Bob")["role"]["name"], json!("User"));
    // No role reference: the document survives without the field.
    assert!(by_name(&rows, "David").get("role").is_none());
}

#[tokio::test]
async fn test_array_reference_is_kept_as_array() {
    let db = db();
    let rows = db.query("User").with("posts").unwrap().get().await.unwrap();
    let titles: Vec<_> = by_name(&rows, "Alice")["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].clone())
        .collect();
    assert_eq!(titles, [json!("First"), json!("Second")]);
    assert_eq!(by_name(&rows, "Charlie")["posts"], json!([]));
}

#[tokio::test]
async fn test_join_stage_shape() {
    let schema = schema();
    let recorder = Recorder::new();
    let db = Mongogate::new(&schema, &recorder);
    db.query("User").with("role").unwrap().get().await.unwrap();
    assert_eq!(
        recorder.last_pipeline(),
        json!([
            { "$lookup": { "from": "roles", "localField": "role", "foreignField": "_id", "as": "role" } },
            { "$unwind": { "path": "$role", "preserveNullAndEmptyArrays": true } }
        ])
    );
}

#[tokio::test]
async fn test_with_is_idempotent() {
    let schema = schema();
    let recorder = Recorder::new();
    let db = Mongogate::new(&schema, &recorder);

    let once = db.query("User").with("role").unwrap().pipeline();
    let twice = db
        .query("User")
        .with("role")
        .unwrap()
        .with("role")
        .unwrap()
        .pipeline();
    assert_eq!(once, twice);

    let nested = db.query("User").with("posts.category").unwrap();
    let len = nested.pipeline().len();
    assert_eq!(nested.with("posts").unwrap().pipeline().len(), len);
}

#[tokio::test]
async fn test_nested_join_reuses_joined_parent() {
    let schema = schema();
    let recorder = Recorder::new();
    let db = Mongogate::new(&schema, &recorder);
    let pipeline = db
        .query("User")
        .with("posts")
        .unwrap()
        .with("posts.category")
        .unwrap()
        .pipeline();
    let kinds: Vec<_> = pipeline.iter().map(Stage::kind).collect();
    assert_eq!(kinds, ["$lookup", "$lookup", "$set", "$unset"]);
}

#[tokio::test]
async fn test_nested_single_in_array_parent() {
    let db = db();
    let rows = db
        .query("User")
        .with("posts.category")
        .unwrap()
        .get()
        .await
        .unwrap();

    let alice = by_name(&rows, "Alice");
    assert_eq!(
        alice["posts"],
        json!([
            { "_id": "p1", "title": "First", "category": { "_id": "c1", "name": "Tech" }, "tags": ["t1", "t2"] },
            { "_id": "p2", "title": "Second", "category": { "_id": "c2", "name": "Life" }, "tags": [] }
        ])
    );
    // Unmatched references stay as they were; length and order are kept.
    assert_eq!(
        by_name(&rows, "Bob")["posts"],
        json!([{ "_id": "p3", "title": "Third", "category": "c404" }])
    );
    assert_eq!(by_name(&rows, "Charlie")["posts"], json!([]));
    assert!(rows.iter().all(|row| !row.contains_key("posts_category__join")));
}

#[tokio::test]
async fn test_nested_array_in_array_parent() {
    let db = db();
    let rows = db.query("User").with("posts.tags").unwrap().get().await.unwrap();

    let alice = by_name(&rows, "Alice");
    let tags: Vec<_> = alice["posts"][0]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].clone())
        .collect();
    assert_eq!(tags, [json!("rust"), json!("db")]);
    assert_eq!(alice["posts"][1]["tags"], json!([]));
    assert_eq!(by_name(&rows, "Bob")["posts"][0]["tags"], json!([]));
}

#[tokio::test]
async fn test_nested_array_in_single_parent() {
    let db = db();
    let rows = db
        .query("User")
        .with("role.permissions")
        .unwrap()
        .get()
        .await
        .unwrap();

    let alice = by_name(&rows, "Alice");
    assert_eq!(alice["role"]["name"], json!("Admin"));
    assert_eq!(
        alice["role"]["permissions"],
        json!([{ "_id": "perm1", "name": "read" }, { "_id": "perm2", "name": "write" }])
    );
    assert_eq!(
        by_name(&rows, "Bob")["role"]["permissions"],
        json!([{ "_id": "perm1", "name": "read" }])
    );
    assert!(by_name(&rows, "David").get("role").is_none());
}

#[tokio::test]
async fn test_select_through_nested_join() {
    let db = db();
    let rows = db
        .query("User")
        .where_eq("name", "Alice")
        .with("posts.category")
        .unwrap()
        .select(["-_id", "-email", "-age", "-isActive", "-createdAt", "-role", "-posts._id", "-posts.tags"])
        .get()
        .await
        .unwrap();
    assert_eq!(
        Value::Object(rows[0].clone()),
        json!({
            "name": "Alice",
            "posts": [
                { "title": "First", "category": { "_id": "c1", "name": "Tech" } },
                { "title": "Second", "category": { "_id": "c2", "name": "Life" } }
            ]
        })
    );
}

#[tokio::test]
async fn test_path_errors() {
    let db = db();

    let err = db.query("User").with("a.b.c").unwrap_err();
    assert_eq!(err.to_string(), "with(): supports up to 2 levels, got 'a.b.c'");

    let err = db.query("User").with("").unwrap_err();
    assert!(matches!(err, MongogateError::EmptyPath));

    let err = db.query("User").with("unknown").unwrap_err();
    assert_eq!(err.to_string(), "Path 'unknown' not found on User schema");

    let err = db.query("User").with("name").unwrap_err();
    assert_eq!(err.to_string(), "Path 'name' is not a ref on User");

    let err = db.query("User").with("posts.title").unwrap_err();
    assert_eq!(err.to_string(), "Path 'title' is not a ref on Post");
}

#[tokio::test]
async fn test_depth_follows_options() {
    let db = db();
    let err = db
        .query_with("User", Options::new().max_join_depth(1))
        .with("posts.category")
        .unwrap_err();
    assert!(matches!(err, MongogateError::DepthExceeded { max: 1, .. }));

    let err = db
        .query_with("User", Options::new().max_join_depth(3))
        .with("posts.category.name")
        .unwrap_err();
    assert!(matches!(err, MongogateError::NestingUnsupported(_)));
}

#[tokio::test]
async fn test_custom_collection_and_identity() {
    let schema = Registry::new()
        .entity(Entity::new("Order").one("customer", "Customer"))
        .entity(Entity::new("Customer").collection("crm_customers").identity("code"));
    let store = MemoryStore::new()
        .with_collection("orders", [json!({ "_id": 1, "customer": "C-7" })])
        .unwrap()
        .with_collection("crm_customers", [json!({ "code": "C-7", "name": "Acme" })])
        .unwrap();
    let db = Mongogate::new(schema, store);

    let row = db
        .query("Order")
        .with("customer")
        .unwrap()
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["customer"]["name"], json!("Acme"));
}
