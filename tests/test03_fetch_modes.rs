use serde_json::json;
use sql_bridge::prelude::*;
use sql_bridge::{SqlType, SqlBridgeError as Error};

const SELECT_PAIR: &str = "select 1 as COLINT, 'x' as COLTEXT";

fn database(mode: FetchMode) -> Result<Database, Error> {
    let env = Environment::builder().worker_threads(2).build()?;
    let db = Database::with_environment(&env, DatabaseOptions::new().with_fetch_mode(mode))?;
    db.open(":memory:")?;
    Ok(db)
}

#[test]
fn array_and_object_shapes() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let out = db.query(SELECT_PAIR)?;
    assert_eq!(serde_json::to_value(&out)?, json!([[1, "x"]]));

    let out = db.query(QueryRequest::new(SELECT_PAIR).fetch_mode(FetchMode::Object))?;
    assert_eq!(serde_json::to_value(&out)?, json!([{"COLINT": 1, "COLTEXT": "x"}]));
    Ok(())
}

#[test]
fn object_is_the_default_shape() -> Result<(), Box<dyn std::error::Error>> {
    let env = Environment::builder().worker_threads(1).build()?;
    let db = Database::with_environment(&env, DatabaseOptions::default())?;
    assert_eq!(db.fetch_mode(), FetchMode::Object);
    db.open(":memory:")?;
    let out = db.query(SELECT_PAIR)?;
    let rows = out.rows().as_objects().ok_or("expected object rows")?;
    assert_eq!(rows[0].get("COLINT"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("COLTEXT"), Some(&Value::Text("x".into())));
    Ok(())
}

#[test]
fn metadata_does_not_change_rows() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let plain = db.query(SELECT_PAIR)?;
    let with_meta = db.query(QueryRequest::new(SELECT_PAIR).include_metadata(true))?;

    assert_eq!(plain.metadata(), None);
    assert_eq!(plain.rows(), with_meta.rows());
    let names: Vec<&str> = with_meta
        .metadata()
        .ok_or("metadata missing")?
        .iter()
        .map(|col| col.name.as_str())
        .collect();
    assert_eq!(names, ["COLINT", "COLTEXT"]);

    let json = serde_json::to_value(&with_meta)?;
    assert_eq!(json["rows"], json!([[1, "x"]]));
    assert_eq!(json["metadata"][0]["COLUMN_NAME"], "COLINT");
    assert_eq!(json["metadata"][1]["COLUMN_NAME"], "COLTEXT");
    assert_eq!(json["metadata"][0]["DATA_TYPE"], 4);
    assert_eq!(json["metadata"][1]["DATA_TYPE"], 12);
    Ok(())
}

#[test]
fn duplicate_names_keep_the_last_value() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Object)?;
    let out = db.query("select 1 as a, 2 as a")?;
    assert_eq!(serde_json::to_value(&out)?, json!([{"a": 2}]));

    let out = db.query(QueryRequest::new("select 1 as a, 2 as a").fetch_mode(FetchMode::Array))?;
    assert_eq!(serde_json::to_value(&out)?, json!([[1, 2]]));
    Ok(())
}

#[test]
fn declared_column_types_are_described() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Object)?;
    db.query("create table typed (COLINT INTEGER, COLDATETIME DATETIME, COLTEXT TEXT, COLNAME VARCHAR(40), COLAMOUNT DECIMAL(10,2))")?;
    db.query("insert into typed values (1, '2024-01-02 03:04:05', 'hello', 'n', 9.5)")?;

    let result = db.query_result("select * from typed")?;
    let meta = result.column_metadata();
    assert_eq!(meta.len(), 5);

    assert_eq!(meta[0].name, "COLINT");
    assert_eq!(meta[0].data_type, SqlType::Integer);
    assert_eq!(meta[0].data_type.code(), 4);

    assert_eq!(meta[1].type_name, "DATETIME");
    assert_eq!(meta[1].data_type.code(), 93);
    assert_eq!(meta[1].column_size, 27);
    assert_eq!(meta[1].decimal_digits, 7);

    assert_eq!(meta[2].data_type.code(), -1);
    assert_eq!(meta[3].column_size, 40);
    assert_eq!(meta[4].data_type, SqlType::Decimal);
    assert_eq!(meta[4].decimal_digits, 2);
    assert_eq!(meta[4].num_prec_radix, 10);

    let row = result.fetch(FetchMode::Object)?.ok_or("missing row")?;
    assert_eq!(row.get("COLDATETIME"), Some(&Value::Text("2024-01-02 03:04:05".into())));
    Ok(())
}

#[test]
fn metadata_is_available_before_the_first_fetch() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let stmt = db.prepare("select 1 as first, 2.5 as second")?;
    let result = stmt.execute()?;
    assert_eq!(result.column_names(), ["first", "second"]);
    assert_eq!(result.column_metadata()[1].data_type, SqlType::Double);

    while result.fetch(FetchMode::Array)?.is_some() {}
    // Descriptors are captured once and survive the end of the rows.
    assert_eq!(result.column_metadata().len(), 2);
    Ok(())
}

#[test]
fn incremental_fetch_ends_with_a_repeating_sentinel() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    db.query("create table seq (n INTEGER)")?;
    for n in 1..=3 {
        db.query(QueryRequest::new("insert into seq values (?)").with_params(vec![Value::from(n)]))?;
    }

    let result = db.query_result("select n from seq order by n")?;
    let mut seen = Vec::new();
    while let Some(row) = result.fetch(FetchMode::Array)? {
        seen.push(row.at(0).and_then(Value::as_int).ok_or("n missing")?);
    }
    assert_eq!(seen, [1, 2, 3]);
    assert_eq!(result.row_count()?, 3);
    assert_eq!(result.fetch(FetchMode::Array)?, None);
    assert_eq!(result.fetch(FetchMode::Object)?, None);
    assert!(result.fetch_remaining()?.rows().is_empty());
    Ok(())
}

#[test]
fn mixed_shapes_across_one_result() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let result = db.query_result("select 1 as n union all select 2 union all select 3")?;
    let first = result.fetch(FetchMode::Object)?.ok_or("missing row")?;
    assert_eq!(first.get("n"), Some(&Value::Int(1)));

    let rest = result.fetch_all(FetchOptions::new(FetchMode::Array).with_metadata(true))?;
    assert_eq!(serde_json::to_value(rest.rows())?, json!([[2], [3]]));
    assert_eq!(rest.metadata().map(<[_]>::len), Some(1));
    Ok(())
}

#[test]
fn boolean_columns_read_as_bool() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Object)?;
    db.query("create table flags (name TEXT, active BOOLEAN)")?;
    db.query(QueryRequest::new("insert into flags values (?, ?), (?, ?)").with_params(vec![
        Value::from("on"),
        Value::from(true),
        Value::from("off"),
        Value::from(false),
    ]))?;

    let out = db.query("select name, active from flags order by name")?;
    assert_eq!(
        serde_json::to_value(&out)?,
        json!([{"name": "off", "active": false}, {"name": "on", "active": true}])
    );
    Ok(())
}

#[test]
fn null_blob_and_float_values() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let out = db.query(QueryRequest::new("select ?, ?, ?").with_params(vec![
        Value::Null,
        Value::from(vec![0xde_u8, 0xad]),
        Value::from(0.5),
    ]))?;
    let rows = out.rows().as_array().ok_or("expected array rows")?;
    assert_eq!(rows[0], [Value::Null, Value::Blob(vec![0xde, 0xad]), Value::Float(0.5)]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_queries_honor_the_requested_shape() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Object)?;
    let object = db.query_async(SELECT_PAIR).await?;
    let array = db
        .query_async(QueryRequest::new(SELECT_PAIR).fetch_mode(FetchMode::Array).include_metadata(true))
        .await?;
    assert_eq!(serde_json::to_value(&object)?, json!([{"COLINT": 1, "COLTEXT": "x"}]));
    assert_eq!(serde_json::to_value(array.rows())?, json!([[1, "x"]]));
    assert!(array.metadata().is_some());
    db.close_async().await?;
    Ok(())
}

#[test]
fn json_requests_pick_shape_and_params() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Object)?;
    let request = QueryRequest::from_json(json!({
        "sql": "select ? as v",
        "params": [41],
        "fetchMode": "ARRAY"
    }))?;
    let out = db.query(request)?;
    assert_eq!(serde_json::to_value(&out)?, json!([[41]]));
    Ok(())
}

#[test]
fn unbounded_select_streams_on_demand() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let result = db.query_result(
        "with recursive c(n) as (select 1 union all select n + 1 from c) select n from c",
    )?;
    for expected in 1..=3 {
        let row = result.fetch(FetchMode::Array)?.ok_or("missing row")?;
        assert_eq!(row.at(0), Some(&Value::Int(expected)));
    }
    assert_eq!(result.row_count()?, 3);

    // Other work on the connection runs between fetches.
    let out = db.query(SELECT_PAIR)?;
    assert_eq!(serde_json::to_value(&out)?, json!([[1, "x"]]));
    let row = result.fetch(FetchMode::Array)?.ok_or("missing row")?;
    assert_eq!(row.at(0), Some(&Value::Int(4)));
    assert!(!result.more_results()?);

    result.close()?;
    assert!(result.more_results().unwrap_err().is_state_error());
    Ok(())
}

#[test]
fn long_values_are_cut_to_the_size_limit() -> Result<(), Box<dyn std::error::Error>> {
    let db = database(FetchMode::Array)?;
    let request = QueryRequest::new("select 'abcdefgh' as t, x'0102030405' as b, 123456789 as n")
        .max_value_size(4);
    let out = db.query(request.clone())?;
    assert_eq!(
        out.rows().as_array(),
        Some(&[vec![
            Value::Text("abcd".into()),
            Value::Blob(vec![1, 2, 3, 4]),
            Value::Int(123_456_789),
        ]][..])
    );

    let result = db.query_result(request)?;
    let row = result.fetch(FetchMode::Array)?.ok_or("missing row")?;
    assert_eq!(row.at(0), Some(&Value::Text("abcd".into())));

    let whole = db.query(QueryRequest::from_json(json!({
        "sql": "select 'abcdefgh' as t",
        "maxValueSize": -1
    }))?)?;
    assert_eq!(serde_json::to_value(&whole)?, json!([["abcdefgh"]]));
    Ok(())
}
