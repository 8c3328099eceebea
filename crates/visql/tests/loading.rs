//! Reading rows back through a connection: get, paging, includes, raw SQL.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use support::*;
use visql::{CommandCache, MySqlProvider, Orm, OrmConfig, Value, lambda};

fn orm() -> Orm {
    Orm::new(MySqlProvider::new())
        .with_cache(Arc::new(CommandCache::new()))
        .with_config(OrmConfig::new().no_truncate())
}

#[tokio::test]
async fn get_by_key_and_by_map() {
    let conn = RecordingConnection::new()
        .returning(vec![order_row(5, 12, 3)])
        .returning(vec![]);
    let found = orm()
        .get::<Order>()
        .by(&OrderKey { id: 5 })
        .unwrap()
        .fetch(&conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.amount, 12);

    let key = HashMap::from([("Id".to_string(), Value::Int(6))]);
    let missing = orm()
        .get::<Order>()
        .by_map(&key)
        .unwrap()
        .fetch(&conn)
        .await
        .unwrap();
    assert!(missing.is_none());

    let commands = conn.commands();
    assert_eq!(commands[0].sql, commands[1].sql);
    assert_eq!(
        commands[1].sql,
        "SELECT id,amount,buyer_id,remark FROM orders WHERE id=@Id"
    );
    assert_eq!(commands[1].parameter("@Id"), Some(&Value::Int(6)));
}

#[tokio::test]
async fn page_reads_total_then_items() {
    let conn = RecordingConnection::new()
        .returning(vec![row(&["COUNT(*)"], vec![Value::Int(21)])])
        .returning(vec![order_row(11, 1, 2), order_row(12, 1, 2)]);
    let page = orm()
        .query::<Order>()
        .where_(lambda::<Order>(|o| o.buyer_id().eq(2)))
        .unwrap()
        .order_by(lambda::<Order>(|o| o.id()))
        .unwrap()
        .to_page::<Order, _>(&conn, 2, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 21);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next());
    assert_eq!(page.items[0].id, 11);
    let commands = conn.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].parameter("@BuyerId"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn include_attaches_children_to_their_parent() {
    let conn = RecordingConnection::new()
        .returning(vec![order_row(1, 10, 7), order_row(2, 20, 7), order_row(3, 5, 8)])
        .returning(vec![
            row(&["id", "order_id", "amount"], vec![100.into(), 2.into(), 4.into()]),
            row(&["id", "order_id", "amount"], vec![101.into(), 1.into(), 6.into()]),
            row(&["id", "order_id", "amount"], vec![102.into(), 2.into(), 16.into()]),
        ]);
    let loaded = orm()
        .query::<Order>()
        .include("Details")
        .unwrap()
        .fetch_all_loaded::<Order, _>(&conn)
        .await
        .unwrap();
    let details: Vec<Vec<Detail>> = loaded
        .iter()
        .map(|l| l.related("Details").unwrap())
        .collect();
    let counts: Vec<_> = details.iter().map(Vec::len).collect();
    assert_eq!(counts, [1, 2, 0]);
    assert_eq!(details[1][1].amount, 16);
    assert_eq!(
        conn.sql()[1],
        "SELECT a.id,a.order_id,a.amount FROM order_detail a WHERE a.order_id IN (@OrderId_0,@OrderId_1,@OrderId_2)"
    );
}

#[tokio::test]
async fn include_with_no_parents_runs_one_query() {
    let conn = RecordingConnection::new();
    let loaded = orm()
        .query::<Order>()
        .include("Details")
        .unwrap()
        .fetch_all_loaded::<Order, _>(&conn)
        .await
        .unwrap();
    assert!(loaded.is_empty());
    assert_eq!(conn.sql().len(), 1);
}

#[tokio::test]
async fn raw_sql_rows_keep_database_labels() {
    let conn = RecordingConnection::new().returning(vec![row(
        &["Id", "Name", "Level"],
        vec![1.into(), "ann".into(), 3.into()],
    )]);
    let buyers: Vec<Buyer> = orm()
        .sql("SELECT id AS Id,name AS Name,level AS Level FROM buyer WHERE level>=@Level")
        .bind_value("Level", 2)
        .fetch_all(&conn)
        .await
        .unwrap();
    assert_eq!(buyers[0].name, "ann");
    assert_eq!(conn.commands()[0].parameter("@Level"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn bulk_insert_executes_each_chunk() {
    let orm = orm().with_config(OrmConfig::new().with_batch_size(2));
    let conn = RecordingConnection::new();
    let rows: Vec<Order> = (0..5).map(|i| Order::new(i, 1)).collect();
    let affected = orm
        .create::<Order>()
        .with_bulk(&rows)
        .unwrap()
        .execute(&conn)
        .await
        .unwrap();
    assert_eq!(affected, 5);
    assert_eq!(conn.commands().len(), 3);
    assert_eq!(conn.commands()[2].parameter("@Amount_0"), Some(&Value::Int(4)));
}
