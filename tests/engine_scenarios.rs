use anyhow::Result;
use rust_sqlite_query::{
    BuilderState, ColumnDescriptor, CompileError, Engine, EngineConfig, QueryError, Record,
    ReturningMode, Row, ScalarType, Table, TableSchema, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    name: String,
    some_number: i64,
}

impl Table for User {
    fn schema() -> TableSchema {
        TableSchema::new("user")
            .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
            .with_column(ColumnDescriptor::new("name", ScalarType::Text))
            .with_column(ColumnDescriptor::new("some_number", ScalarType::Int))
    }
}

// Helper function to create an in-memory engine with the user table pushed
fn create_test_engine(returning: ReturningMode) -> Result<(Engine, Arc<TableSchema>)> {
    let engine = Engine::open(EngineConfig::in_memory().with_returning(returning))?;
    let users = engine.push_table::<User>()?;
    Ok((engine, users))
}

// Helper function to create a temporary file-backed engine
fn create_temp_engine() -> Result<(Engine, Arc<TableSchema>, NamedTempFile)> {
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_string_lossy().to_string();
    let engine = Engine::open(EngineConfig::new(path))?;
    let users = engine.push_table::<User>()?;
    Ok((engine, users, temp_file))
}

fn user(schema: &TableSchema, name: &str, some_number: i64) -> Record {
    Record::construct(
        schema,
        [("name", Value::from(name)), ("some_number", Value::from(some_number))],
    )
    .unwrap()
}

fn seed(engine: &Engine, users: &TableSchema) -> Result<()> {
    engine.insert(&[user(users, "foo", 100), user(users, "bar", 150)])?;
    Ok(())
}

fn names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = rows
        .iter()
        .filter_map(Row::as_record)
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_canonical_scenario() {
    test_canonical_scenario_impl(ReturningMode::Auto).unwrap();
}

#[tokio::test]
async fn test_canonical_scenario_with_emulated_returning() {
    test_canonical_scenario_impl(ReturningMode::Emulated).unwrap();
}

fn test_canonical_scenario_impl(returning: ReturningMode) -> Result<()> {
    let (engine, users) = create_test_engine(returning)?;
    seed(&engine, &users)?;

    let id = users.column("id")?;
    let some_number = users.column("some_number")?;

    let count = engine
        .query([id.count()])
        .filter(some_number.ge(100)?)?
        .first()?;
    assert_eq!(count, Some(Row::Tuple(vec![Value::Integer(2)])));

    let deleted = engine
        .delete(&users)
        .filter(some_number.lt(125)?)?
        .returning()?
        .all()?;
    assert_eq!(deleted.len(), 1);
    let foo = deleted[0].as_record().expect("full-row returning yields records");
    assert_eq!(foo.get("name"), Some(&Value::from("foo")));
    assert_eq!(foo.get("some_number"), Some(&Value::Integer(100)));

    let remaining = engine.select(&users).all()?;
    assert_eq!(names(&remaining), vec!["bar"]);
    Ok(())
}

#[tokio::test]
async fn test_push_is_idempotent() {
    test_push_is_idempotent_impl().unwrap();
}

fn test_push_is_idempotent_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let again = engine.push_table::<User>()?;
    assert!(Arc::ptr_eq(&users, &again));

    let total = engine.query([users.count_all()]).one()?;
    assert_eq!(total.as_tuple(), Some(&[Value::Integer(2)][..]));
    Ok(())
}

#[tokio::test]
async fn test_schema_conflict_keeps_registered_schema() {
    test_schema_conflict_keeps_registered_schema_impl().unwrap();
}

fn test_schema_conflict_keeps_registered_schema_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;

    let without_number = TableSchema::new("user")
        .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
        .with_column(ColumnDescriptor::new("name", ScalarType::Text));
    let err = engine.push(without_number).unwrap_err();
    assert!(matches!(err, QueryError::SchemaConflict { ref table } if table == "user"));

    assert_eq!(engine.schema("user")?.columns().len(), 3);
    let rows = engine.select(&users).all()?;
    assert_eq!(names(&rows), vec!["bar", "foo"]);
    Ok(())
}

#[tokio::test]
async fn test_insert_then_query_round_trips_records() {
    test_insert_then_query_round_trips_records_impl().unwrap();
}

fn test_insert_then_query_round_trips_records_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    let batch = vec![
        User {
            id: None,
            name: "a".into(),
            some_number: 1,
        },
        User {
            id: None,
            name: "b".into(),
            some_number: 2,
        },
        User {
            id: Some(40),
            name: "c".into(),
            some_number: 3,
        },
    ];
    engine.insert_typed(&batch)?;

    let some_number = users.column("some_number")?;
    let mut stored: Vec<User> = engine
        .select(&users)
        .order_by(&some_number, true)?
        .all()?
        .into_iter()
        .map(|row| row.into_record().expect("record").into_table())
        .collect::<Result<_, _>>()?;
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].id, Some(40));
    for (stored, source) in stored.iter_mut().zip(&batch) {
        assert!(stored.id.is_some());
        stored.id = source.id;
    }
    assert_eq!(stored, batch);
    Ok(())
}

#[tokio::test]
async fn test_first_on_empty_result_is_no_rows() {
    test_first_on_empty_result_is_no_rows_impl().unwrap();
}

fn test_first_on_empty_result_is_no_rows_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let some_number = users.column("some_number")?;

    let none = engine
        .select(&users)
        .filter(some_number.gt(1_000)?)?
        .first()?;
    assert_eq!(none, None);

    let err = engine
        .select(&users)
        .filter(some_number.gt(1_000)?)?
        .one()
        .unwrap_err();
    assert!(matches!(err, QueryError::NoRows));
    Ok(())
}

#[tokio::test]
async fn test_filters_are_repeatable() {
    test_filters_are_repeatable_impl().unwrap();
}

fn test_filters_are_repeatable_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let name = users.column("name")?;
    let some_number = users.column("some_number")?;
    let predicate = name.eq("foo")?.or(some_number.ge(150)?);

    let first = engine.select(&users).filter(predicate.clone())?.all()?;
    let second = engine.select(&users).filter(predicate)?.all()?;
    assert_eq!(first, second);
    assert_eq!(names(&first), vec!["bar", "foo"]);
    Ok(())
}

#[tokio::test]
async fn test_projection_shapes() {
    test_projection_shapes_impl().unwrap();
}

fn test_projection_shapes_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let name = users.column("name")?;
    let some_number = users.column("some_number")?;

    let full = engine.query(users.all_columns()).all()?;
    assert!(full.iter().all(Row::is_record));

    let partial = engine
        .query([&name])
        .order_by(&name, false)?
        .all()?;
    assert_eq!(
        partial,
        vec![
            Row::Tuple(vec![Value::from("foo")]),
            Row::Tuple(vec![Value::from("bar")]),
        ]
    );

    let stats = engine
        .query([some_number.sum()?, some_number.avg()?, some_number.max()?])
        .one()?;
    assert_eq!(
        stats.into_tuple(),
        Some(vec![Value::Integer(250), Value::Real(125.0), Value::Integer(150)])
    );

    let grouped = engine
        .query(users.all_columns())
        .group_by(&[users.column("id")?])?
        .all()?;
    assert!(grouped.iter().all(|row| !row.is_record()));
    Ok(())
}

#[tokio::test]
async fn test_limit_and_offset() {
    test_limit_and_offset_impl().unwrap();
}

fn test_limit_and_offset_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    engine.insert(&[
        user(&users, "a", 1),
        user(&users, "b", 2),
        user(&users, "c", 3),
    ])?;
    let name = users.column("name")?;
    let some_number = users.column("some_number")?;

    let page = engine
        .query([&name])
        .order_by(&some_number, true)?
        .limit(1)?
        .offset(1)?
        .all()?;
    assert_eq!(page, vec![Row::Tuple(vec![Value::from("b")])]);

    let tail = engine
        .query([&name])
        .order_by(&some_number, true)?
        .offset(2)?
        .all()?;
    assert_eq!(tail, vec![Row::Tuple(vec![Value::from("c")])]);
    Ok(())
}

#[tokio::test]
async fn test_builder_state_machine() {
    test_builder_state_machine_impl().unwrap();
}

fn test_builder_state_machine_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let some_number = users.column("some_number")?;

    let mut query = engine.select(&users);
    assert_eq!(query.state(), BuilderState::Fresh);
    query.filter(some_number.ge(0)?)?;
    assert_eq!(query.state(), BuilderState::Filtered);
    assert!(matches!(
        query.filter(some_number.lt(10)?),
        Err(QueryError::InvalidTransition { state: BuilderState::Filtered, .. })
    ));
    assert!(matches!(
        query.returning(),
        Err(QueryError::InvalidOperation(_))
    ));
    assert_eq!(query.all()?.len(), 2);
    assert_eq!(query.state(), BuilderState::Consumed);
    assert!(matches!(query.all(), Err(QueryError::BuilderReused)));
    assert!(matches!(query.first(), Err(QueryError::BuilderReused)));
    assert!(matches!(query.limit(1), Err(QueryError::BuilderReused)));

    let mut delete = engine.delete(&users);
    assert!(matches!(
        delete.returning(),
        Err(QueryError::InvalidTransition { state: BuilderState::Fresh, .. })
    ));
    assert!(matches!(delete.limit(1), Err(QueryError::InvalidOperation(_))));
    assert!(matches!(
        delete.filter(some_number.expr()),
        Err(QueryError::InvalidOperation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_compile_errors_never_reach_storage() {
    test_compile_errors_never_reach_storage_impl().unwrap();
}

fn test_compile_errors_never_reach_storage_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;

    let empty = engine.query(Vec::<rust_sqlite_query::Expr>::new()).all();
    assert!(matches!(
        empty,
        Err(QueryError::Compile(CompileError::EmptyProjection))
    ));

    let posts = TableSchema::new("post")
        .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key());
    let post_id = posts.column("id")?;
    let unregistered = engine.query([&post_id]).all();
    assert!(matches!(unregistered, Err(QueryError::NotRegistered(ref t)) if t == "post"));

    let mixed = engine
        .select(&users)
        .filter(post_id.eq(1)?)?
        .all();
    assert!(matches!(
        mixed,
        Err(QueryError::Compile(CompileError::MixedTables { .. }))
    ));

    let some_number = users.column("some_number")?;
    assert!(some_number.eq("text").is_err());

    let count = engine.query([users.count_all()]).one()?;
    assert_eq!(count.as_tuple(), Some(&[Value::Integer(2)][..]));
    Ok(())
}

#[tokio::test]
async fn test_aggregate_filters_fail_before_storage() {
    test_aggregate_filters_fail_before_storage_impl().unwrap();
}

fn test_aggregate_filters_fail_before_storage_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let id = users.column("id")?;
    let some_number = users.column("some_number")?;

    let err = engine
        .query([id.expr()])
        .filter(id.count().ge(1)?)
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Compile(CompileError::AggregateInFilter { .. })
    ));

    let nested = some_number.ge(0)?.and(some_number.sum()?.gt(10)?);
    let err = engine.delete(&users).filter(nested).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Compile(CompileError::AggregateInFilter { .. })
    ));

    assert_eq!(engine.select(&users).all()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_null_assignment_fails_before_storage() {
    test_null_assignment_fails_before_storage_impl().unwrap();
}

fn test_null_assignment_fails_before_storage_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let name = users.column("name")?;

    let err = engine.update([name.set(Value::Null)?]).execute().unwrap_err();
    assert!(matches!(
        err,
        QueryError::Compile(CompileError::NullAssignment { ref column }) if column == "user.name"
    ));
    assert_eq!(names(&engine.select(&users).all()?), vec!["bar", "foo"]);
    Ok(())
}

#[tokio::test]
async fn test_int_columns_compare_against_real_literals() {
    test_int_columns_compare_against_real_literals_impl().unwrap();
}

fn test_int_columns_compare_against_real_literals_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    seed(&engine, &users)?;
    let name = users.column("name")?;
    let some_number = users.column("some_number")?;

    let below = engine
        .query([&name])
        .filter(some_number.lt(100.5)?)?
        .all()?;
    assert_eq!(below, vec![Row::Tuple(vec![Value::from("foo")])]);

    assert!(some_number.set(100.5).is_err());
    Ok(())
}

#[tokio::test]
async fn test_zero_param_limit_from_config_file() {
    test_zero_param_limit_from_config_file_impl().unwrap();
}

fn test_zero_param_limit_from_config_file_impl() -> Result<()> {
    let config: EngineConfig = serde_json::from_str(
        r#"{"db_path": ":memory:", "returning": "emulated", "max_params_per_statement": 0}"#,
    )?;
    let engine = Engine::open(config)?;
    assert_eq!(engine.config().max_params_per_statement, 1);
    let users = engine.push_table::<User>()?;
    seed(&engine, &users)?;
    let some_number = users.column("some_number")?;

    let mut bumped: Vec<Value> = engine
        .update([some_number.add(1)?])
        .filter(some_number.ge(0)?)?
        .returning_columns(&[some_number.clone()])?
        .all()?
        .into_iter()
        .filter_map(Row::into_tuple)
        .flatten()
        .collect();
    bumped.sort_by_key(|v| v.as_i64());
    assert_eq!(bumped, vec![Value::Integer(101), Value::Integer(151)]);

    let full = engine
        .update([some_number.sub(1)?])
        .filter(some_number.ge(0)?)?
        .returning()?
        .all()?;
    assert_eq!(full.len(), 2);
    assert!(full.iter().all(Row::is_record));
    Ok(())
}

#[tokio::test]
async fn test_non_finite_default_is_rejected_on_push() {
    test_non_finite_default_is_rejected_on_push_impl().unwrap();
}

fn test_non_finite_default_is_rejected_on_push_impl() -> Result<()> {
    let engine = Engine::in_memory()?;
    let gauges = TableSchema::new("gauge")
        .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
        .with_column(ColumnDescriptor::new("reading", ScalarType::Real).with_default(f64::NAN));
    assert!(matches!(
        engine.push(gauges),
        Err(QueryError::InvalidSchema { ref table, .. }) if table == "gauge"
    ));
    assert!(matches!(
        engine.schema("gauge"),
        Err(QueryError::NotRegistered(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_insert_batches_are_atomic() {
    test_insert_batches_are_atomic_impl().unwrap();
}

fn test_insert_batches_are_atomic_impl() -> Result<()> {
    let (engine, users) = create_test_engine(ReturningMode::Auto)?;
    let clash = |name: &str| {
        Record::construct(
            &users,
            [
                ("id", Value::Integer(7)),
                ("name", Value::from(name)),
                ("some_number", Value::Integer(1)),
            ],
        )
        .unwrap()
    };
    let err = engine
        .insert(&[user(&users, "ok", 1), clash("x"), clash("y")])
        .unwrap_err();
    assert!(matches!(err, QueryError::Storage(_)));
    assert_eq!(engine.select(&users).all()?.len(), 0);

    let missing = Record::construct(&users, [("name", "no number")])?;
    assert!(matches!(
        engine.insert(&[missing]),
        Err(QueryError::MissingValue { ref column, .. }) if column == "some_number"
    ));

    let posts = engine.push(
        TableSchema::new("post")
            .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
            .with_column(ColumnDescriptor::new("title", ScalarType::Text)),
    )?;
    let post = Record::construct(&posts, [("title", "hello")])?;
    assert!(matches!(
        engine.insert(&[user(&users, "a", 1), post]),
        Err(QueryError::HeterogeneousBatch { .. })
    ));
    assert_eq!(engine.select(&users).all()?.len(), 0);

    engine.insert(&[])?;
    Ok(())
}

#[tokio::test]
async fn test_large_batches_split_inside_one_transaction() {
    test_large_batches_split_inside_one_transaction_impl().unwrap();
}

fn test_large_batches_split_inside_one_transaction_impl() -> Result<()> {
    let engine = Engine::open(EngineConfig::in_memory().with_max_params(9))?;
    let users = engine.push_table::<User>()?;
    let batch: Vec<Record> = (0..10)
        .map(|i| user(&users, &format!("u{i}"), i))
        .collect();
    engine.insert(&batch)?;
    let count = engine.query([users.count_all()]).one()?;
    assert_eq!(count.as_tuple(), Some(&[Value::Integer(10)][..]));
    Ok(())
}

#[tokio::test]
async fn test_insert_returning_assigns_keys() {
    test_insert_returning_assigns_keys_impl(ReturningMode::Auto).unwrap();
    test_insert_returning_assigns_keys_impl(ReturningMode::Emulated).unwrap();
}

fn test_insert_returning_assigns_keys_impl(returning: ReturningMode) -> Result<()> {
    let (engine, users) = create_test_engine(returning)?;
    let mut stored = engine.insert_returning(&[user(&users, "foo", 100), user(&users, "bar", 150)])?;
    assert_eq!(stored.len(), 2);
    stored.sort_by_key(|record| record.get("id").and_then(Value::as_i64));
    assert_eq!(stored[0].get("id"), Some(&Value::Integer(1)));
    assert_eq!(stored[0].get("name"), Some(&Value::from("foo")));
    assert_eq!(stored[1].get("id"), Some(&Value::Integer(2)));
    assert_eq!(stored[1].get("name"), Some(&Value::from("bar")));
    Ok(())
}

#[tokio::test]
async fn test_delete_variants() {
    test_delete_variants_impl(ReturningMode::Auto).unwrap();
    test_delete_variants_impl(ReturningMode::Emulated).unwrap();
}

fn test_delete_variants_impl(returning: ReturningMode) -> Result<()> {
    let (engine, users) = create_test_engine(returning)?;
    engine.insert(&[
        user(&users, "a", 1),
        user(&users, "b", 2),
        user(&users, "c", 3),
        user(&users, "d", 4),
    ])?;
    let id = users.column("id")?;
    let some_number = users.column("some_number")?;

    let ids = engine
        .delete(&users)
        .filter(some_number.eq(1)?)?
        .returning_columns(&[id.clone()])?
        .all()?;
    assert_eq!(ids, vec![Row::Tuple(vec![Value::Integer(1)])]);

    let one = engine
        .delete(&users)
        .filter(some_number.ge(2)?)?
        .returning()?
        .first()?
        .and_then(Row::into_record)
        .expect("one deleted record");
    assert_eq!(one.get("name"), Some(&Value::from("b")));

    let affected = engine
        .delete(&users)
        .filter(id.is_in([3, 99])?)?
        .execute()?;
    assert_eq!(affected, 1);

    let nothing = engine
        .delete(&users)
        .filter(some_number.gt(100)?)?
        .returning()?
        .all()?;
    assert!(nothing.is_empty());

    let everything = engine.delete(&users).execute()?;
    assert_eq!(everything, 1);
    assert!(engine.select(&users).all()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_variants() {
    test_update_variants_impl(ReturningMode::Auto).unwrap();
    test_update_variants_impl(ReturningMode::Emulated).unwrap();
}

fn test_update_variants_impl(returning: ReturningMode) -> Result<()> {
    let (engine, users) = create_test_engine(returning)?;
    seed(&engine, &users)?;
    let name = users.column("name")?;
    let some_number = users.column("some_number")?;

    let bumped = engine
        .update([some_number.add(1)?])
        .filter(name.eq("foo")?)?
        .returning_columns(&[some_number.clone()])?
        .all()?;
    assert_eq!(bumped, vec![Row::Tuple(vec![Value::Integer(101)])]);

    // The filter no longer matches after the update; the returned row must
    // still be the updated one.
    let renamed = engine
        .update([name.set("baz")?, some_number.mul(2)?])
        .filter(name.eq("bar")?)?
        .returning()?
        .one()?
        .into_record()
        .expect("record");
    assert_eq!(renamed.get("name"), Some(&Value::from("baz")));
    assert_eq!(renamed.get("some_number"), Some(&Value::Integer(300)));

    let affected = engine.update([some_number.sub(1)?]).execute()?;
    assert_eq!(affected, 2);

    let values = engine
        .query([&some_number])
        .order_by(&some_number, true)?
        .all()?;
    assert_eq!(
        values,
        vec![
            Row::Tuple(vec![Value::Integer(100)]),
            Row::Tuple(vec![Value::Integer(299)]),
        ]
    );

    let empty = engine.update(Vec::new()).execute();
    assert!(matches!(
        empty,
        Err(QueryError::Compile(CompileError::EmptyAssignments))
    ));
    Ok(())
}

#[tokio::test]
async fn test_bool_blob_and_real_columns() {
    test_bool_blob_and_real_columns_impl().unwrap();
}

fn test_bool_blob_and_real_columns_impl() -> Result<()> {
    let engine = Engine::in_memory()?;
    let items = engine.push(
        TableSchema::new("item")
            .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
            .with_column(ColumnDescriptor::new("active", ScalarType::Bool).with_default(true))
            .with_column(ColumnDescriptor::new("price", ScalarType::Real))
            .with_column(ColumnDescriptor::new("payload", ScalarType::Blob).nullable()),
    )?;
    engine.insert(&[
        Record::construct(&items, [("price", Value::Integer(2)), ("payload", Value::Blob(vec![1, 2]))])?,
        Record::construct(&items, [("price", Value::Real(0.5)), ("active", Value::Boolean(false))])?,
    ])?;

    let active = items.column("active")?;
    let payload = items.column("payload")?;
    let price = items.column("price")?;

    let on = engine.select(&items).filter(active.eq(true)?)?.one()?;
    let on = on.as_record().expect("record");
    assert_eq!(on.get("active"), Some(&Value::Boolean(true)));
    assert_eq!(on.get("price"), Some(&Value::Real(2.0)));
    assert_eq!(on.get("payload"), Some(&Value::Blob(vec![1, 2])));

    let without_payload = engine
        .query([&active])
        .filter(payload.eq(Value::Null)?)?
        .all()?;
    assert_eq!(without_payload, vec![Row::Tuple(vec![Value::Boolean(false)])]);

    let cheap = engine.query([price.count()]).filter(price.lt(1)?)?.one()?;
    assert_eq!(cheap.as_tuple(), Some(&[Value::Integer(1)][..]));
    Ok(())
}

#[tokio::test]
async fn test_file_database_persists_across_engines() {
    test_file_database_persists_across_engines_impl().unwrap();
}

fn test_file_database_persists_across_engines_impl() -> Result<()> {
    let (engine, users, temp_file) = create_temp_engine()?;
    seed(&engine, &users)?;
    engine.close()?;

    let path = temp_file.path().to_string_lossy().to_string();
    let reopened = Engine::open(EngineConfig::new(path.clone()))?;
    let users = reopened.push_table::<User>()?;
    let rows = reopened.select(&users).all()?;
    assert_eq!(names(&rows), vec!["bar", "foo"]);
    reopened.close()?;

    // The table on disk has three columns; a two-column declaration of the
    // same name must not be accepted by a fresh registry either.
    let fresh = Engine::open(EngineConfig::new(path))?;
    let narrower = TableSchema::new("user")
        .with_column(ColumnDescriptor::new("id", ScalarType::Int).primary_key())
        .with_column(ColumnDescriptor::new("name", ScalarType::Text));
    assert!(matches!(
        fresh.push(narrower),
        Err(QueryError::SchemaConflict { .. })
    ));
    Ok(())
}
