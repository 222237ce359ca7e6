use serde_json::json;
use sql_bridge::prelude::*;
use sql_bridge::SqlBridgeError as Error;

fn open_memory() -> Result<Connection, Error> {
    let conn = Environment::builder().worker_threads(2).build()?.allocate()?;
    conn.open(":memory:")?;
    Ok(conn)
}

fn shape(mode: FetchMode) -> FetchOptions {
    FetchOptions::new(mode)
}

#[test]
fn rebinding_sees_only_the_latest_values() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    stmt.prepare("select ? as col1, ? as col2")?;

    stmt.bind(&[Value::from("a"), Value::from("b")])?;
    let first = stmt.execute()?.fetch_all(shape(FetchMode::Array))?;
    assert_eq!(serde_json::to_value(first.rows())?, json!([["a", "b"]]));

    stmt.bind(&[Value::from("c"), Value::from("d")])?;
    let second = stmt.execute()?.fetch_all(shape(FetchMode::Object))?;
    assert_eq!(
        serde_json::to_value(second.rows())?,
        json!([{"col1": "c", "col2": "d"}])
    );

    drop(stmt);
    conn.close()?;
    Ok(())
}

#[test]
fn rebinding_closes_the_open_result() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    stmt.prepare("select ? as v")?;
    stmt.bind(&[Value::from(1)])?;
    let stale = stmt.execute()?;

    stmt.bind(&[Value::from(2)])?;
    assert!(stale.fetch(FetchMode::Array).unwrap_err().is_state_error());

    let fresh = stmt.execute()?;
    // Executing again invalidates the earlier result of the same statement too.
    let newest = stmt.execute()?;
    assert!(fresh.fetch(FetchMode::Array).unwrap_err().is_state_error());
    let row = newest.fetch(FetchMode::Array)?.ok_or("missing row")?;
    assert_eq!(row.at(0), Some(&Value::Int(2)));
    Ok(())
}

#[test]
fn lifecycle_order_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    assert!(!stmt.is_prepared()?);
    assert!(stmt.execute().unwrap_err().is_state_error());
    assert!(stmt.bind(&[Value::from(1)]).unwrap_err().is_state_error());

    stmt.prepare("select ? as v")?;
    assert!(stmt.is_prepared()?);
    assert!(stmt.execute().unwrap_err().is_bind_error());
    assert!(stmt.bind(&[]).unwrap_err().is_bind_error());
    assert!(
        stmt.bind(&[Value::from(1), Value::from(2)])
            .unwrap_err()
            .is_bind_error()
    );

    stmt.close()?;
    assert!(stmt.prepare("select 1").unwrap_err().is_state_error());
    Ok(())
}

#[test]
fn preparing_again_switches_sql() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    stmt.prepare("select ? as a")?;
    stmt.bind(&[Value::from("x")])?;

    stmt.prepare("select 10 as b, 20 as c")?;
    assert_eq!(stmt.sql()?.as_deref(), Some("select 10 as b, 20 as c"));
    let out = stmt.execute()?.fetch_all(shape(FetchMode::Array))?;
    assert_eq!(serde_json::to_value(out.rows())?, json!([[10, 20]]));
    Ok(())
}

#[test]
fn failed_prepare_leaves_statement_unprepared() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    stmt.prepare("select 1")?;

    let err = stmt.prepare("selec nonsense").unwrap_err();
    assert!(matches!(err, Error::SyntaxError(_)));
    assert!(!stmt.is_prepared()?);
    assert!(stmt.execute().unwrap_err().is_state_error());
    Ok(())
}

#[test]
fn failed_execute_keeps_statement_prepared() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    conn.query("create table uniq (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")?;

    let stmt = conn.create_statement()?;
    stmt.prepare("insert into uniq (name) values (?)")?;
    stmt.bind(&[Value::from("dup")])?;
    stmt.execute()?;

    let err = stmt.execute().unwrap_err();
    assert!(matches!(err, Error::ExecutionError(_)));
    assert_eq!(err.sqlstate(), Some("23000"));
    assert!(stmt.is_prepared()?);

    stmt.bind(&[Value::from("other")])?;
    let result = stmt.execute()?;
    assert_eq!(result.row_count()?, 1);
    drop(result);
    drop(stmt);

    let out = conn.query(QueryRequest::new("select name from uniq order by id").fetch_mode(FetchMode::Array))?;
    assert_eq!(serde_json::to_value(out.rows())?, json!([["dup"], ["other"]]));
    Ok(())
}

#[test]
fn typed_parameters_bind() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let ts = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(12, 30, 0))
        .ok_or("bad timestamp")?;
    let stmt = conn.create_statement()?;
    stmt.prepare("select ? as i, ? as f, ? as t, ? as b, ? as n, ? as ts")?;
    stmt.bind(&[
        Value::from(7),
        Value::from(1.25),
        Value::from("txt"),
        Value::from(true),
        Value::Null,
        Value::from(ts),
    ])?;
    let out = stmt.execute()?.fetch_all(shape(FetchMode::Object))?;
    assert_eq!(
        serde_json::to_value(out.rows())?,
        json!([{"i": 7, "f": 1.25, "t": "txt", "b": 1, "n": null, "ts": "2024-02-29 12:30:00"}])
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebinding_through_async_entry_points() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_memory()?;
    let stmt = conn.create_statement()?;
    stmt.prepare_async("select ? as col1, ? as col2").await?;

    for (a, b) in [("a", "b"), ("c", "d"), ("e", "f")] {
        stmt.bind_async(vec![Value::from(a), Value::from(b)]).await?;
        let result = stmt.execute_async().await?;
        let out = result.fetch_all_async(shape(FetchMode::Array)).await?;
        assert_eq!(serde_json::to_value(out.rows())?, json!([[a, b]]));
    }

    stmt.close_async().await?;
    conn.close_async().await?;
    assert!(!conn.is_connected());
    Ok(())
}
