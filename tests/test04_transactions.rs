use sql_bridge::prelude::*;
use sql_bridge::SqlBridgeError as Error;

const CREATE: &str = "create table tx_test (COLINT INTEGER, COLDATETIME DATETIME, COLTEXT TEXT)";
const INSERT: &str = "insert into tx_test (COLINT, COLDATETIME, COLTEXT) values (?, ?, ?)";

fn open_with_table() -> Result<Connection, Error> {
    let conn = Environment::builder().worker_threads(2).build()?.allocate()?;
    conn.open(":memory:")?;
    conn.query(CREATE)?;
    Ok(conn)
}

fn insert_row(conn: &Connection) -> Result<QueryOutput, Error> {
    conn.query(QueryRequest::new(INSERT).with_params(vec![Value::from(42), Value::Null, Value::Null]))
}

fn count(conn: &Connection) -> Result<i64, Box<dyn std::error::Error>> {
    let out = conn.query(QueryRequest::new("select count(*) from tx_test").fetch_mode(FetchMode::Array))?;
    let rows = out.rows().as_array().ok_or("expected array rows")?;
    Ok(rows[0][0].as_int().ok_or("count is not an integer")?)
}

#[test]
fn rollback_discards_the_insert() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;
    conn.begin_transaction()?;
    insert_row(&conn)?;
    assert_eq!(count(&conn)?, 1);
    conn.rollback_transaction()?;
    assert_eq!(count(&conn)?, 0);
    Ok(())
}

#[test]
fn commit_keeps_the_insert() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;
    conn.begin_transaction()?;
    insert_row(&conn)?;
    conn.commit_transaction()?;
    assert_eq!(count(&conn)?, 1);

    let out = conn.query("select * from tx_test")?;
    let rows = out.rows().as_objects().ok_or("expected object rows")?;
    assert_eq!(rows[0].get("COLINT"), Some(&Value::Int(42)));
    assert_eq!(rows[0].get("COLDATETIME"), Some(&Value::Null));
    assert_eq!(rows[0].get("COLTEXT"), Some(&Value::Null));
    Ok(())
}

#[test]
fn auto_commit_follows_transaction_boundaries() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;
    assert!(conn.auto_commit());
    conn.begin_transaction()?;
    assert!(!conn.auto_commit());
    conn.commit_transaction()?;
    assert!(conn.auto_commit());

    conn.begin_transaction()?;
    conn.rollback_transaction()?;
    assert!(conn.auto_commit());
    Ok(())
}

#[test]
fn nested_or_orphan_boundaries_are_state_errors() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;
    assert!(conn.commit_transaction().unwrap_err().is_state_error());
    assert!(conn.rollback_transaction().unwrap_err().is_state_error());

    conn.begin_transaction()?;
    let err = conn.begin_transaction().unwrap_err();
    assert!(err.is_state_error());
    assert!(err.to_string().contains("already open"));
    conn.rollback_transaction()?;
    Ok(())
}

#[test]
fn transactions_need_an_open_connection() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Environment::builder().worker_threads(1).build()?.allocate()?;
    assert!(conn.begin_transaction().unwrap_err().is_state_error());
    Ok(())
}

#[test]
fn closing_rolls_back_an_open_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tx.db");
    let path = path.to_str().ok_or("non-utf8 temp path")?;
    let env = Environment::builder().worker_threads(1).build()?;

    let conn = env.allocate()?;
    conn.open(path)?;
    conn.query(CREATE)?;
    conn.begin_transaction()?;
    insert_row(&conn)?;
    conn.close()?;
    assert!(conn.auto_commit());

    conn.open(path)?;
    assert_eq!(count(&conn)?, 0);
    conn.close()?;
    Ok(())
}

#[test]
fn sql_level_begin_is_tracked() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;
    conn.query("BEGIN")?;
    assert!(!conn.auto_commit());
    assert!(conn.begin_transaction().unwrap_err().is_state_error());
    conn.commit_transaction()?;
    assert!(conn.auto_commit());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_boundaries_run_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_table()?;

    let begin = conn.begin_transaction_async();
    let insert = conn.query_async(
        QueryRequest::new(INSERT).with_params(vec![Value::from(42), Value::Null, Value::Null]),
    );
    let rollback = conn.rollback_transaction_async();
    begin.await?;
    insert.await?;
    rollback.await?;
    assert_eq!(count(&conn)?, 0);

    conn.begin_transaction_async().await?;
    conn.query_async(QueryRequest::new(INSERT).with_params(vec![Value::from(7), Value::Null, Value::from("kept")]))
        .await?;
    conn.commit_transaction_async().await?;
    assert_eq!(count(&conn)?, 1);
    assert!(conn.auto_commit());

    let err = conn.commit_transaction_async().await.unwrap_err();
    assert!(err.is_state_error());
    Ok(())
}
