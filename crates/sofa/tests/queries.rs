// End-to-end queries against the in-memory find endpoint.

use serde::Deserialize;
use serde_json::{Value as Json, json};
use sofa::{
    Classification, ClassificationTable, Client, Config, DatabaseError, DatabaseErrorKind,
    Error, MemoryDatabase, OperationKind, QueryErrorKind, SequenceError, field, flag,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Character {
    name: String,
    #[serde(default)]
    surname: Option<String>,
    age: i64,
    is_jedi: bool,
}

fn characters() -> Vec<Json> {
    vec![
        json!({"_id": "1", "name": "Luke", "surname": "Skywalker", "age": 19, "isJedi": true}),
        json!({"_id": "2", "name": "Leia", "surname": "Organa", "age": 19, "isJedi": false}),
        json!({"_id": "3", "name": "Han", "surname": "Solo", "age": 32, "isJedi": false}),
        json!({"_id": "4", "name": "Yoda", "age": 900, "isJedi": true}),
        json!({"_id": "5", "name": "Anakin", "surname": "Skywalker", "age": 45, "isJedi": true}),
    ]
}

fn setup() -> Client<MemoryDatabase> {
    Client::new(MemoryDatabase::new().with_database("character", characters()))
}

fn names(characters: &[Character]) -> Vec<&str> {
    characters.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn test_where_and() {
    let db = setup().database_for::<Character>();
    let query = db
        .query()
        .filter(field("name").eq("Luke").and(field("surname").eq("Skywalker")));

    assert_eq!(
        query.to_query_string().unwrap(),
        r#"{"selector":{"$and":[{"name":"Luke"},{"surname":"Skywalker"}]}}"#
    );
    assert_eq!(names(&query.to_list().await.unwrap()), vec!["Luke"]);
}

#[tokio::test]
async fn test_where_or_and_nor() {
    let db = setup().database_for::<Character>();
    let luke_or_leia = field("name").eq("Luke").or(field("name").eq("Leia"));

    let either = db.query().filter(luke_or_leia.clone());
    assert_eq!(
        either.to_query_string().unwrap(),
        r#"{"selector":{"$or":[{"name":"Luke"},{"name":"Leia"}]}}"#
    );
    assert_eq!(names(&either.to_list().await.unwrap()), vec!["Luke", "Leia"]);

    let neither = db.query().filter(luke_or_leia.not());
    assert_eq!(
        neither.to_query_string().unwrap(),
        r#"{"selector":{"$nor":[{"name":"Luke"},{"name":"Leia"}]}}"#
    );
    assert_eq!(
        names(&neither.to_list().await.unwrap()),
        vec!["Han", "Yoda", "Anakin"]
    );
}

#[tokio::test]
async fn test_sorting() {
    let db = setup().database_for::<Character>();
    let sorted = db.query().order_by("name").then_by("age");
    assert_eq!(
        sorted.to_query_string().unwrap(),
        r#"{"sort":["name","age"],"selector":{}}"#
    );
    assert_eq!(
        names(&sorted.to_list().await.unwrap()),
        vec!["Anakin", "Han", "Leia", "Luke", "Yoda"]
    );

    let mixed = db.query().order_by("name").then_by_descending("age");
    let err = mixed.to_list().await.unwrap_err();
    assert_eq!(err.query_kind(), Some(QueryErrorKind::InvalidQuery));
}

#[tokio::test]
async fn test_skip_take() {
    let client = setup();
    let db = client.database_for::<Character>();
    let page = db.query().skip(1).take(2);
    assert_eq!(
        page.to_query_string().unwrap(),
        r#"{"skip":1,"limit":2,"selector":{}}"#
    );
    assert_eq!(names(&page.to_list().await.unwrap()), vec!["Leia", "Han"]);

    // Take then skip keeps sequence semantics
    let narrowed = db.query().take(3).skip(2);
    assert_eq!(
        narrowed.to_query_string().unwrap(),
        r#"{"limit":1,"skip":2,"selector":{}}"#
    );
    assert_eq!(names(&narrowed.to_list().await.unwrap()), vec!["Han"]);
}

#[tokio::test]
async fn test_min_matches_manual_chain() {
    let client = setup();
    let typed = client.database_for::<Character>();
    let raw = client.database::<Json>("character");

    let manual = raw.query().order_by("age").take(1).select(["age"]);
    let min_request = {
        client.sender().clear_requests();
        let min: i64 = typed.query().min("age").await.unwrap();
        assert_eq!(min, 19);
        client.sender().last_request().unwrap().request
    };

    assert_eq!(
        min_request.to_json_string().unwrap(),
        manual.to_query_string().unwrap()
    );
    assert_eq!(
        manual.to_list().await.unwrap(),
        vec![json!({"age": 19})]
    );
}

#[tokio::test]
async fn test_aggregates() {
    let db = setup().database_for::<Character>();

    let max: i64 = db.query().max("age").await.unwrap();
    assert_eq!(max, 900);

    let sum: i64 = db.query().sum("age").await.unwrap();
    assert_eq!(sum, 1015);

    let average = db.query().average("age").await.unwrap();
    assert!((average - 203.0).abs() < f64::EPSILON);

    let jedi_sum: f64 = db.query().filter(flag("is_jedi")).sum("age").await.unwrap();
    assert!((jedi_sum - 964.0).abs() < f64::EPSILON);

    let err = db
        .query()
        .filter(field("name").eq("Rey"))
        .max::<i64>("age")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sequence(SequenceError::NoElements)));
}

#[tokio::test]
async fn test_single() {
    let client = setup();
    let db = client.database_for::<Character>();

    let luke = db
        .query()
        .filter(field("name").eq("Luke"))
        .single()
        .await
        .unwrap();
    assert_eq!(luke.surname.as_deref(), Some("Skywalker"));
    assert_eq!(
        client.sender().last_request().unwrap().request.to_json_string().unwrap(),
        r#"{"selector":{"name":"Luke"},"limit":2}"#
    );

    let skywalkers = db.query().filter(field("surname").eq("Skywalker"));
    assert!(matches!(
        skywalkers.single().await.unwrap_err(),
        Error::Sequence(SequenceError::MoreThanOneElement)
    ));
    assert!(matches!(
        skywalkers.single_or_default().await.unwrap_err(),
        Error::Sequence(SequenceError::MoreThanOneElement)
    ));

    let nobody = db.query().filter(field("name").eq("Rey"));
    assert!(matches!(
        nobody.single().await.unwrap_err(),
        Error::Sequence(SequenceError::NoElements)
    ));
    assert_eq!(nobody.single_or_default().await.unwrap(), None);
    assert_eq!(nobody.first_or_default().await.unwrap(), None);
}

#[tokio::test]
async fn test_first_and_last() {
    let client = setup();
    let db = client.database_for::<Character>();

    let youngest = db.query().order_by("age").first().await.unwrap();
    assert_eq!(youngest.name, "Luke");

    let jedi = db.query().first_where(flag("is_jedi")).await.unwrap();
    assert_eq!(jedi.name, "Luke");

    let oldest = db.query().order_by("age").last().await.unwrap();
    assert_eq!(oldest.name, "Yoda");
    let request = client.sender().last_request().unwrap().request;
    assert_eq!(request.get("limit"), None);

    let none = db
        .query()
        .filter(field("age").gt(1000))
        .last_or_default()
        .await
        .unwrap();
    assert_eq!(none, None);
}

#[tokio::test]
async fn test_element_terminals_with_predicates() {
    let client = setup();
    let db = client.database_for::<Character>();
    let by_age = db.query().order_by("age");

    let elder = by_age.first_or_default_where(field("age").gt(30)).await.unwrap();
    assert_eq!(elder.map(|c| c.name), Some("Han".to_string()));
    let request = client.sender().last_request().unwrap().request;
    assert_eq!(request.selector(), Some(&json!({"age": {"$gt": 30}})));
    assert_eq!(request.get("limit"), Some(&json!(1)));
    assert_eq!(
        by_age.first_or_default_where(field("name").eq("Rey")).await.unwrap(),
        None
    );

    let yoda = db.query().single_or_default_where(field("name").eq("Yoda")).await.unwrap();
    assert_eq!(yoda.map(|c| c.age), Some(900));
    let request = client.sender().last_request().unwrap().request;
    assert_eq!(request.get("limit"), Some(&json!(2)));
    assert!(matches!(
        db.query()
            .single_or_default_where(field("surname").eq("Skywalker"))
            .await
            .unwrap_err(),
        Error::Sequence(SequenceError::MoreThanOneElement)
    ));
    assert_eq!(
        db.query().single_or_default_where(field("name").eq("Rey")).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_last_where_runs_on_the_client() {
    let client = setup();
    let db = client.database_for::<Character>();
    let by_age = db.query().order_by("age");

    let oldest_jedi = by_age.last_where(flag("is_jedi")).await.unwrap();
    assert_eq!(oldest_jedi.name, "Yoda");
    let request = client.sender().last_request().unwrap().request;
    assert_eq!(request.selector(), Some(&json!({})));
    assert_eq!(request.get("limit"), None);

    let oldest_human = by_age.last_where(field("age").lt(100)).await.unwrap();
    assert_eq!(oldest_human.name, "Anakin");

    assert_eq!(
        by_age.last_or_default_where(field("age").gt(1000)).await.unwrap(),
        None
    );
    assert!(matches!(
        by_age.last_where(field("age").gt(1000)).await.unwrap_err(),
        Error::Sequence(SequenceError::NoElements)
    ));
}

#[tokio::test]
async fn test_missing_fields_match_the_same_on_both_sides() {
    let client = Client::new(MemoryDatabase::new().with_database(
        "sparse",
        vec![json!({"_id": "a", "age": 40}), json!({"_id": "b"})],
    ));
    let db = client.database::<Json>("sparse");

    let young = field("age").lt(30);
    assert_eq!(db.query().first_or_default_where(young.clone()).await.unwrap(), None);
    assert_eq!(db.query().last_or_default_where(young).await.unwrap(), None);

    let not_forty = field("age").ne(40);
    assert_eq!(db.query().filter(not_forty.clone()).to_list().await.unwrap(), Vec::<Json>::new());
    assert_eq!(db.query().last_or_default_where(not_forty).await.unwrap(), None);

    assert_eq!(
        db.query().last_or_default_where(field("age").missing()).await.unwrap(),
        Some(json!({"_id": "b"}))
    );
}

#[tokio::test]
async fn test_any_and_all() {
    let client = setup();
    let db = client.database_for::<Character>();

    assert!(db.query().any().await.unwrap());
    assert!(db.query().any_where(field("age").gt(800)).await.unwrap());
    assert!(!db.query().any_where(field("name").eq("Rey")).await.unwrap());

    assert!(db.query().all(field("age").ge(18)).await.unwrap());
    assert_eq!(
        client.sender().last_request().unwrap().request.to_json_string().unwrap(),
        r#"{"selector":{"$not":{"age":{"$gte":18}}},"limit":1}"#
    );

    assert!(!db.query().all(flag("is_jedi")).await.unwrap());
    assert_eq!(
        client.sender().last_request().unwrap().request.to_json_string().unwrap(),
        r#"{"selector":{"isJedi":false},"limit":1}"#
    );
}

#[tokio::test]
async fn test_find_result_metadata_and_bookmarks() {
    let db = setup().database_for::<Character>();

    let first_page = db
        .query()
        .take(2)
        .include_execution_stats()
        .to_find_result()
        .await
        .unwrap();
    assert_eq!(names(&first_page.docs), vec!["Luke", "Leia"]);
    assert_eq!(first_page.execution_stats.unwrap().results_returned, 2);
    assert_eq!(first_page.warning, None);

    let bookmark = first_page.bookmark.unwrap();
    let second_page = db
        .query()
        .use_bookmark(bookmark)
        .take(2)
        .to_list()
        .await
        .unwrap();
    assert_eq!(names(&second_page), vec!["Han", "Yoda"]);
}

#[tokio::test]
async fn test_split_discriminator() {
    let fixture = MemoryDatabase::new().with_database(
        "characters",
        vec![
            json!({"name": "Luke", "age": 19, "isJedi": true, "split_discriminator": "rebel"}),
            json!({"name": "Leia", "age": 19, "isJedi": false, "split_discriminator": "rebel"}),
            json!({"name": "Vader", "age": 45, "isJedi": true, "split_discriminator": "empire"}),
        ],
    );
    let client = Client::new(fixture);
    let rebels = client
        .database::<Character>("characters")
        .with_discriminator("rebel");
    assert_eq!(rebels.discriminator(), Some("rebel"));

    let jedi = rebels.query().filter(flag("is_jedi"));
    assert_eq!(
        jedi.to_query_string().unwrap(),
        r#"{"selector":{"$and":[{"split_discriminator":"rebel"},{"isJedi":true}]}}"#
    );
    assert_eq!(names(&jedi.to_list().await.unwrap()), vec!["Luke"]);
    assert_eq!(rebels.query().to_list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_database_errors_propagate_unchanged() {
    let client = setup();
    let db = client.database_for::<Character>();

    let conflict = DatabaseError::new(DatabaseErrorKind::Conflict, "Document update conflict.")
        .with_status(409);
    client.sender().fail_next(conflict.clone());
    match db.query().to_list().await.unwrap_err() {
        Error::Database(err) => assert_eq!(err, conflict),
        other => panic!("unexpected error: {other}"),
    }

    let missing = client.database::<Character>("droids");
    match missing.query().any().await.unwrap_err() {
        Error::Database(err) => assert_eq!(err.kind, DatabaseErrorKind::NotFound),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_client_only_classification_gives_same_results() {
    let table = ClassificationTable::default()
        .with(OperationKind::Take, Classification::ClientOnly)
        .with(OperationKind::Filter, Classification::ClientOnly);
    let client = Client::with_config(
        MemoryDatabase::new().with_database("character", characters()),
        Config::default().with_classification(table),
    );
    let db = client.database_for::<Character>();

    let query = db.query().filter(flag("is_jedi")).take(2);
    assert_eq!(query.to_query_string().unwrap(), r#"{"selector":{}}"#);
    assert_eq!(names(&query.to_list().await.unwrap()), vec!["Luke", "Yoda"]);
}

#[tokio::test]
async fn test_client_only_ordering_and_projection() {
    let table = ClassificationTable::default()
        .with(OperationKind::OrderByDescending, Classification::ClientOnly)
        .with(OperationKind::ThenBy, Classification::ClientOnly)
        .with(OperationKind::Project, Classification::ClientOnly)
        .with(OperationKind::IncludeConflicts, Classification::ClientOnly);
    let client = Client::with_config(
        MemoryDatabase::new().with_database("character", characters()),
        Config::default().with_classification(table),
    );
    let db = client.database::<Json>("character");

    let query = db
        .query()
        .filter(field("age").lt(100))
        .order_by_descending("age")
        .then_by("name")
        .select(["name"]);
    assert_eq!(
        query.to_query_string().unwrap(),
        r#"{"selector":{"age":{"$lt":100}}}"#
    );
    assert_eq!(
        query.to_list().await.unwrap(),
        vec![
            json!({"name": "Anakin"}),
            json!({"name": "Han"}),
            json!({"name": "Leia"}),
            json!({"name": "Luke"}),
        ]
    );

    // Rejected while compiling, before any request goes out.
    client.sender().clear_requests();
    let err = db.query().include_conflicts().to_list().await.unwrap_err();
    assert_eq!(err.query_kind(), Some(QueryErrorKind::UnsupportedOperation));
    assert!(client.sender().requests().is_empty());
}

#[tokio::test]
async fn test_unsupported_operation_is_reported() {
    let table = ClassificationTable::default().without(OperationKind::Sum);
    let client = Client::with_config(
        MemoryDatabase::new().with_database("character", characters()),
        Config::default().with_classification(table),
    );
    let err = client
        .database_for::<Character>()
        .query()
        .sum::<i64>("age")
        .await
        .unwrap_err();
    assert_eq!(err.query_kind(), Some(QueryErrorKind::UnsupportedOperation));
    assert!(client.sender().requests().is_empty());
}

#[tokio::test]
async fn test_field_overrides() {
    let fixture = MemoryDatabase::new().with_database(
        "character",
        vec![json!({"name": "Luke", "last_name": "Skywalker", "age": 19, "isJedi": true})],
    );
    let client = Client::with_config(
        fixture,
        Config::default().with_field_override("surname", "last_name"),
    );
    let query = client
        .database::<Json>("character")
        .query()
        .filter(field("surname").eq("Skywalker"));
    assert_eq!(
        query.to_query_string().unwrap(),
        r#"{"selector":{"last_name":"Skywalker"}}"#
    );
    assert_eq!(query.to_list().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_share_one_client() {
    let client = setup();
    let db = client.database_for::<Character>();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let db = db.clone();
        tasks.spawn(async move {
            let query = db
                .query()
                .filter(field("age").lt(50).and(flag("is_jedi")))
                .order_by_descending("age");
            let text = query.to_query_string().unwrap();
            let found = query.to_list().await.unwrap();
            (text, names(&found).join(","))
        });
    }

    while let Some(result) = tasks.join_next().await {
        let (text, found) = result.unwrap();
        assert_eq!(
            text,
            r#"{"selector":{"$and":[{"age":{"$lt":50}},{"isJedi":true}]},"sort":[{"age":"desc"}]}"#
        );
        assert_eq!(found, "Anakin,Luke");
    }
    assert_eq!(client.sender().requests().len(), 16);
}
