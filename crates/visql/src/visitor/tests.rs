use super::*;
use crate::fixtures::*;
use crate::error::OrmError;
use crate::expr::{Expr, IntoExpr};
use crate::lambda::{FromQuery, lambda, lambda_with_query, lambda2};
use crate::mapping::{Entity, EntityMapProvider, FieldHandle, MapRegistry};
use crate::provider::{
    DatabaseType, MySqlProvider, OracleProvider, OrmProvider, PostgreSqlProvider,
    SqlServerProvider,
};
use crate::row::Row;
use crate::value::Value;
use std::sync::Arc;

fn maps() -> Arc<dyn EntityMapProvider> {
    Arc::new(MapRegistry::new())
}

fn mysql() -> Arc<dyn OrmProvider> {
    Arc::new(MySqlProvider::new())
}

fn postgres() -> Arc<dyn OrmProvider> {
    Arc::new(PostgreSqlProvider::new())
}

fn delete_sql(provider: Arc<dyn OrmProvider>, predicates: &[crate::lambda::Lambda]) -> String {
    let mut visitor = DeleteVisitor::new(provider, maps(), Order::entity_type());
    for predicate in predicates {
        visitor.where_(predicate).unwrap();
    }
    visitor.build_sql().unwrap().sql
}

fn query(provider: Arc<dyn OrmProvider>) -> QueryVisitor {
    QueryVisitor::new(provider, maps(), Order::entity_type())
}

fn update(provider: Arc<dyn OrmProvider>) -> UpdateVisitor {
    UpdateVisitor::new(provider, maps(), Order::entity_type())
}

// ==================== DELETE ====================

#[test]
fn delete_binds_constant_under_member_name() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    visitor
        .where_(&lambda::<Order>(|o| o.buyer_id().eq(5)))
        .unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(cmd.sql, "DELETE FROM order WHERE buyer_id=@BuyerId");
    assert_eq!(cmd.parameter("@BuyerId"), Some(&Value::Int(5)));
}

#[test]
fn delete_without_predicate_clears_table() {
    assert_eq!(delete_sql(mysql(), &[]), "DELETE FROM order");
}

#[test]
fn repeated_where_is_anded_with_parentheses() {
    let sql = delete_sql(
        mysql(),
        &[
            lambda::<Order>(|o| o.buyer_id().eq(5)),
            lambda::<Order>(|o| o.amount().gt(10).or(o.amount().lt(0))),
        ],
    );
    assert_eq!(
        sql,
        "DELETE FROM order WHERE buyer_id=@BuyerId AND (amount>@Amount OR amount<@Amount2)"
    );
}

// ==================== Deferred booleans ====================

#[test]
fn has_value_renders_null_checks() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().has_value())]),
        "DELETE FROM order WHERE shipped_at IS NOT NULL"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.shipped_at().has_value())]),
        "DELETE FROM order WHERE shipped_at IS NULL"
    );
}

#[test]
fn condition_compared_with_boolean_folds() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().has_value().eq(true))]),
        "DELETE FROM order WHERE shipped_at IS NOT NULL"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().has_value().eq(false))]),
        "DELETE FROM order WHERE NOT (shipped_at IS NOT NULL)"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().has_value().ne(true))]),
        "DELETE FROM order WHERE NOT (shipped_at IS NOT NULL)"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| false.into_expr().eq(o.amount().gt(1)))]),
        "DELETE FROM order WHERE NOT (amount>@Amount)"
    );
}

#[test]
fn condition_compared_with_non_boolean_is_rejected() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    let err = visitor
        .where_(&lambda::<Order>(|o| o.shipped_at().has_value().eq(1)))
        .unwrap_err();
    assert!(err.is_unsupported());

    let err = visitor
        .where_(&lambda::<Order>(|o| o.amount().gt(1).gt(o.is_paid())))
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn non_boolean_member_is_not_a_condition() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    let err = visitor
        .where_(&lambda::<Order>(|o| o.amount()))
        .unwrap_err();
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("Amount"));

    let err = visitor
        .where_(&lambda::<Order>(|o| !o.remark()))
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn bare_boolean_member_uses_dialect_literal() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.is_paid())]),
        "DELETE FROM order WHERE is_paid=1"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.is_paid())]),
        "DELETE FROM order WHERE is_paid=0"
    );
    assert_eq!(
        delete_sql(postgres(), &[lambda::<Order>(|o| o.is_paid())]),
        "DELETE FROM order WHERE is_paid=TRUE"
    );
    assert_eq!(
        delete_sql(postgres(), &[lambda::<Order>(|o| !!o.is_paid())]),
        "DELETE FROM order WHERE is_paid=TRUE"
    );
}

#[test]
fn boolean_member_inside_and() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.is_paid().and(o.amount().gt(1)))]),
        "DELETE FROM order WHERE is_paid=1 AND amount>@Amount"
    );
}

#[test]
fn negation_inverts_comparisons() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.amount().gt(10))]),
        "DELETE FROM order WHERE amount<=@Amount"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.amount().eq(10))]),
        "DELETE FROM order WHERE amount<>@Amount"
    );
}

#[test]
fn negated_conjunction_is_wrapped() {
    assert_eq!(
        delete_sql(
            mysql(),
            &[lambda::<Order>(|o| !(o.amount().gt(1).and(o.buyer_id().eq(2))))]
        ),
        "DELETE FROM order WHERE NOT (amount>@Amount AND buyer_id=@BuyerId)"
    );
}

#[test]
fn null_comparison_becomes_is_null() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().eq(Expr::null()))]),
        "DELETE FROM order WHERE shipped_at IS NULL"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.shipped_at().ne(Expr::null()))]),
        "DELETE FROM order WHERE shipped_at IS NOT NULL"
    );
}

#[test]
fn constant_operands_fold() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.amount().gt(1).or(true))]),
        "DELETE FROM order WHERE 1=1"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.amount().gt(1).and(true))]),
        "DELETE FROM order WHERE amount>@Amount"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|_| Expr::constant(1).eq(2))]),
        "DELETE FROM order WHERE 1=0"
    );
}

#[test]
fn empty_in_list_never_matches() {
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| o.id().in_list(Vec::<i64>::new()))]),
        "DELETE FROM order WHERE 1=0"
    );
    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.id().in_list(Vec::<i64>::new()))]),
        "DELETE FROM order WHERE 1=1"
    );
}

#[test]
fn in_list_names_parameters_after_member() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    visitor
        .where_(&lambda::<Order>(|o| o.id().in_list([1, 2, 3])))
        .unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(cmd.sql, "DELETE FROM order WHERE id IN (@Id,@Id1,@Id2)");
    assert_eq!(cmd.parameter("@Id2"), Some(&Value::Int(3)));
}

#[test]
fn like_patterns_are_bound() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    visitor
        .where_(&lambda::<Order>(|o| o.remark().starts_with("vip")))
        .unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(cmd.sql, "DELETE FROM order WHERE remark LIKE @Remark");
    assert_eq!(cmd.parameter("@Remark"), Some(&Value::String("vip%".into())));

    assert_eq!(
        delete_sql(mysql(), &[lambda::<Order>(|o| !o.remark().contains("x"))]),
        "DELETE FROM order WHERE remark NOT LIKE @Remark"
    );
}

#[test]
fn captured_values_are_evaluated_once_bound() {
    let threshold = 42_i64;
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    visitor
        .where_(&lambda::<Order>(|o| {
            o.amount().ge(Expr::captured(move || threshold))
        }))
        .unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(cmd.sql, "DELETE FROM order WHERE amount>=@Amount");
    assert_eq!(cmd.parameter("@Amount"), Some(&Value::Int(42)));
}

#[test]
fn static_members_render_per_dialect() {
    let pred = || lambda::<Order>(|o| o.shipped_at().lt(Expr::now()));
    assert_eq!(
        delete_sql(mysql(), &[pred()]),
        "DELETE FROM order WHERE shipped_at<NOW()"
    );
    assert_eq!(
        delete_sql(Arc::new(OracleProvider::new()), &[pred()]),
        "DELETE FROM order WHERE shipped_at<SYSDATE"
    );
}

#[test]
fn unknown_member_is_reported() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    let err = visitor
        .where_(&lambda::<Order>(|o| o.member("Nope").eq(1)))
        .unwrap_err();
    assert!(matches!(err, OrmError::MissingMember { .. }));
}

#[test]
fn parameter_type_must_match_table() {
    let mut visitor = DeleteVisitor::new(mysql(), maps(), Order::entity_type());
    let err = visitor
        .where_(&lambda::<Buyer>(|b| b.level().eq(1)))
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
}

// ==================== UPDATE ====================

#[test]
fn update_single_table() {
    let mut visitor = update(mysql());
    visitor
        .set(&lambda::<Order>(|o| {
            Expr::new_object([("Amount", o.amount() + 1), ("Remark", Expr::constant("x"))])
        }))
        .unwrap();
    visitor.where_(&lambda::<Order>(|o| o.id().eq(7))).unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(
        cmd.sql,
        "UPDATE order SET amount=amount+@Amount,remark=@Remark WHERE id=@Id"
    );
    assert_eq!(cmd.parameters.len(), 3);
}

#[test]
fn update_set_field_and_null() {
    let mut visitor = update(postgres());
    visitor
        .set_field(&lambda::<Order>(|o| o.remark()), Value::Null)
        .unwrap();
    visitor
        .set_field(&lambda::<Order>(|o| o.amount()), Value::Int(3))
        .unwrap();
    let cmd = visitor.build_sql().unwrap();
    assert_eq!(cmd.sql, "UPDATE order SET remark=NULL,amount=@Amount");
}

#[test]
fn update_join_on_mysql_prefixes_set_targets() {
    let mut visitor = update(mysql());
    visitor
        .join(
            JoinType::Inner,
            Buyer::entity_type(),
            &lambda2::<Order, Buyer>(|o, b| o.buyer_id().eq(b.id())),
        )
        .unwrap();
    visitor
        .set(&lambda2::<Order, Buyer>(|_, b| {
            Expr::new_object([("Remark", b.name())])
        }))
        .unwrap();
    visitor
        .where_(&lambda2::<Order, Buyer>(|_, b| b.level().gt(2)))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql,
        "UPDATE order a INNER JOIN buyer b ON a.buyer_id=b.id SET a.remark=b.name WHERE b.level>@Level"
    );
}

#[test]
fn update_from_on_postgres() {
    let mut visitor = update(postgres());
    visitor.from(&[Buyer::entity_type()]).unwrap();
    visitor
        .set(&lambda2::<Order, Buyer>(|_, b| {
            Expr::new_object([("Remark", b.name())])
        }))
        .unwrap();
    visitor
        .where_(&lambda2::<Order, Buyer>(|o, b| o.buyer_id().eq(b.id())))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql,
        "UPDATE order a SET remark=b.name FROM buyer b WHERE a.buyer_id=b.id"
    );
}

#[test]
fn update_multi_table_capabilities_fail_at_the_clause() {
    let on = lambda2::<Order, Buyer>(|o, b| o.buyer_id().eq(b.id()));
    let providers: Vec<Arc<dyn OrmProvider>> = vec![
        postgres(),
        Arc::new(SqlServerProvider::new()),
        Arc::new(OracleProvider::new()),
    ];
    for provider in providers {
        let database = provider.database_type();
        let err = update(provider)
            .join(JoinType::Inner, Buyer::entity_type(), &on)
            .unwrap_err();
        assert!(
            matches!(err, OrmError::UnsupportedDialect { operation: "UPDATE ... JOIN", .. }),
            "{database:?}: {err}"
        );
    }

    let err = update(mysql()).from(&[Buyer::entity_type()]).unwrap_err();
    assert!(matches!(
        err,
        OrmError::UnsupportedDialect {
            database: DatabaseType::MySql,
            ..
        }
    ));
    let err = update(Arc::new(OracleProvider::new()))
        .from(&[Buyer::entity_type()])
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn update_tables_must_precede_set() {
    let mut visitor = update(postgres());
    visitor
        .set_field(&lambda::<Order>(|o| o.amount()), Value::Int(1))
        .unwrap();
    let err = visitor.from(&[Buyer::entity_type()]).unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
}

#[test]
fn update_without_set_is_rejected() {
    let mut visitor = update(mysql());
    visitor.where_(&lambda::<Order>(|o| o.id().eq(1))).unwrap();
    assert!(matches!(
        visitor.build_sql().unwrap_err(),
        OrmError::InvalidArgument(_)
    ));
}

#[test]
fn update_set_from_correlated_query() {
    let assign = lambda_with_query::<Order>(|o, q| {
        Expr::new_object([(
            "Amount",
            q.from::<Detail>()
                .where_(|d| d.order_id().eq(o.id()))
                .select(|d| d.amount().sum())
                .into_expr(),
        )])
    });

    let err = update(mysql()).set(&assign).unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));

    let mut visitor = update(mysql());
    visitor.set_from_query(&assign).unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql,
        "UPDATE order SET amount=(SELECT SUM(b.amount) AS Column0 FROM detail b WHERE b.order_id=order.id)"
    );
}

#[test]
fn set_target_must_be_a_column_member() {
    let mut visitor = update(mysql());
    let err = visitor
        .set(&lambda::<Order>(|o| Expr::new_object([("Details", o.id())])))
        .unwrap_err();
    assert!(err.is_unsupported());
}

// ==================== SELECT ====================

#[test]
fn query_defaults_to_all_columns() {
    let mut visitor = query(mysql());
    visitor
        .where_(&lambda::<Order>(|o| o.buyer_id().eq(5)))
        .unwrap();
    visitor
        .order_by(&lambda::<Order>(|o| o.amount()), true)
        .unwrap();
    visitor.take(10);
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.sql(),
        format!(
            "SELECT {ORDER_COLUMNS} FROM order a WHERE a.buyer_id=@BuyerId ORDER BY a.amount DESC LIMIT 10"
        )
    );
    assert_eq!(built.labels()[..3], ["Id", "Amount", "BuyerId"]);
    assert!(!built.is_paged());
}

#[test]
fn query_join_with_projection() {
    let mut visitor = query(mysql());
    visitor
        .join(
            JoinType::Left,
            Buyer::entity_type(),
            &lambda2::<Order, Buyer>(|o, b| o.buyer_id().eq(b.id())),
        )
        .unwrap();
    visitor
        .select(&lambda2::<Order, Buyer>(|o, b| {
            Expr::new_object([
                ("Id", o.id()),
                ("BuyerName", b.name()),
                ("Total", o.amount() * 2),
            ])
        }))
        .unwrap();
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.sql(),
        "SELECT a.id AS Id,b.name AS BuyerName,a.amount*@Amount AS Total FROM order a LEFT JOIN buyer b ON a.buyer_id=b.id"
    );
    assert_eq!(built.labels(), ["Id", "BuyerName", "Total"]);
    assert!(built.reader_fields[2].member.is_none());
}

#[test]
fn projection_labels_alias_snake_case_columns() {
    let mut visitor = QueryVisitor::new(mysql(), maps(), Buyer::entity_type());
    visitor
        .select(&lambda::<Buyer>(|b| Expr::new_object([("Name", b.name()), ("Lvl", b.level())])))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.name AS Name,a.level AS Lvl FROM buyer a"
    );
}

#[test]
fn paging_emits_count_then_page() {
    let mut visitor = query(mysql());
    visitor
        .where_(&lambda::<Order>(|o| o.buyer_id().eq(5)))
        .unwrap();
    visitor.select(&lambda::<Order>(|o| o.id())).unwrap();
    visitor.order_by(&lambda::<Order>(|o| o.id()), false).unwrap();
    visitor.page(2, 10).unwrap();
    let built = visitor.build_sql().unwrap();
    assert!(built.is_paged());
    assert_eq!(
        built.sql(),
        "SELECT COUNT(*) FROM order a WHERE a.buyer_id=@BuyerId;\
         SELECT a.id AS Id FROM order a WHERE a.buyer_id=@BuyerId ORDER BY a.id LIMIT 10 OFFSET 10"
    );
    assert_eq!(built.parameters().len(), 1);
}

#[test]
fn paging_on_sql_server_needs_an_order() {
    let mut visitor = QueryVisitor::new(
        Arc::new(SqlServerProvider::new()),
        maps(),
        Order::entity_type(),
    );
    visitor.select(&lambda::<Order>(|o| o.id())).unwrap();
    visitor.page(0, 20).unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT COUNT(*) FROM order a;\
         SELECT a.id AS Id FROM order a ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 20 ROWS ONLY"
    );
}

#[test]
fn distinct_paging_counts_the_subquery() {
    let mut visitor = query(postgres());
    visitor.select(&lambda::<Order>(|o| o.buyer_id())).unwrap();
    visitor.distinct();
    visitor.page(1, 5).unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT COUNT(*) FROM (SELECT DISTINCT a.buyer_id AS BuyerId FROM order a) t;\
         SELECT DISTINCT a.buyer_id AS BuyerId FROM order a LIMIT 5 OFFSET 0"
    );
}

#[test]
fn zero_page_size_is_rejected() {
    assert!(matches!(
        query(mysql()).page(1, 0).unwrap_err(),
        OrmError::InvalidArgument(_)
    ));
}

#[test]
fn page_offset_overflow_is_rejected() {
    assert!(matches!(
        query(mysql()).page(u64::MAX, 10).unwrap_err(),
        OrmError::InvalidArgument(_)
    ));
    let mut visitor = query(mysql());
    visitor.page(u64::MAX, 1).unwrap();
}

#[test]
fn oracle_uses_colon_parameters() {
    let mut visitor = query(Arc::new(OracleProvider::new()));
    visitor
        .where_(&lambda::<Order>(|o| o.amount().ge(100)))
        .unwrap();
    visitor.skip(5);
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.sql(),
        format!("SELECT {ORDER_COLUMNS} FROM order a WHERE a.amount>=:Amount OFFSET 5 ROWS")
    );
    assert_eq!(built.command.parameter(":Amount"), Some(&Value::Int(100)));
}

#[test]
fn group_by_and_having() {
    let mut visitor = query(mysql());
    visitor
        .select(&lambda::<Order>(|o| {
            Expr::new_object([("BuyerId", o.buyer_id()), ("Total", o.amount().sum())])
        }))
        .unwrap();
    visitor.group_by(&lambda::<Order>(|o| o.buyer_id())).unwrap();
    visitor
        .having(&lambda::<Order>(|o| o.amount().sum().gt(100)))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.buyer_id AS BuyerId,SUM(a.amount) AS Total FROM order a GROUP BY a.buyer_id HAVING SUM(a.amount)>@p0"
    );
}

#[test]
fn exists_subquery_is_correlated() {
    let mut visitor = QueryVisitor::new(mysql(), maps(), Buyer::entity_type());
    visitor
        .where_(&lambda_with_query::<Buyer>(|b, q| {
            Expr::exists(
                q.from::<Order>()
                    .where_(|o| o.buyer_id().eq(b.id()))
                    .select(|o| o.id()),
            )
        }))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.id,a.name,a.level FROM buyer a WHERE EXISTS (SELECT b.id AS Id FROM order b WHERE b.buyer_id=a.id)"
    );

    let mut visitor = QueryVisitor::new(mysql(), maps(), Buyer::entity_type());
    visitor
        .where_(&lambda_with_query::<Buyer>(|b, q| {
            !Expr::exists(
                q.from::<Order>()
                    .where_(|o| o.buyer_id().eq(b.id()))
                    .select(|o| o.id()),
            )
        }))
        .unwrap();
    assert!(visitor.build_sql().unwrap().sql().contains(" WHERE NOT EXISTS (SELECT "));
}

#[test]
fn in_subquery_shares_parameters() {
    let mut visitor = query(mysql());
    visitor
        .where_(&lambda::<Order>(|o| {
            o.buyer_id().in_query(
                FromQuery::detached()
                    .from::<Buyer>()
                    .where_(|b| b.level().gt(3))
                    .select(|b| b.id()),
            )
        }))
        .unwrap();
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.sql(),
        format!(
            "SELECT {ORDER_COLUMNS} FROM order a WHERE a.buyer_id IN (SELECT b.id AS Id FROM buyer b WHERE b.level>@Level)"
        )
    );
    assert_eq!(built.command.parameter("@Level"), Some(&Value::Int(3)));
}

#[test]
fn union_continues_aliases_and_parameters() {
    let mut visitor = query(mysql());
    visitor.select(&lambda::<Order>(|o| o.id())).unwrap();
    visitor
        .where_(&lambda::<Order>(|o| o.amount().gt(10)))
        .unwrap();
    let other = FromQuery::detached()
        .from::<Order>()
        .where_(|o| o.amount().lt(1))
        .select(|o| o.id())
        .into_def();
    visitor.union(&other, true).unwrap();
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.sql(),
        "SELECT a.id AS Id FROM order a WHERE a.amount>@Amount UNION ALL SELECT b.id AS Id FROM order b WHERE b.amount<@Amount1"
    );
    assert_eq!(built.parameters().len(), 2);
}

#[test]
fn conditional_and_concat_in_select() {
    let mut visitor = query(mysql());
    visitor
        .select(&lambda::<Order>(|o| {
            Expr::new_object([
                ("Paid", Expr::case(o.is_paid(), "yes", "no")),
                ("Label", o.remark() + "!"),
            ])
        }))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT CASE WHEN a.is_paid=1 THEN @p0 ELSE @p1 END AS Paid,CONCAT(a.remark,@Remark) AS Label FROM order a"
    );

    let mut visitor = query(postgres());
    visitor
        .select(&lambda::<Order>(|o| Expr::new_object([("Label", o.remark() + "!")])))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.remark||@Remark AS Label FROM order a"
    );
}

#[test]
fn arithmetic_keeps_right_grouping() {
    let mut visitor = query(mysql());
    visitor
        .select(&lambda::<Order>(|o| {
            Expr::new_object([
                ("X", o.amount() - (o.buyer_id() - o.id())),
                ("Y", (o.amount() + o.id()) * o.buyer_id()),
                ("Z", -(o.amount() + o.id())),
            ])
        }))
        .unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.amount-(a.buyer_id-a.id) AS X,(a.amount+a.id)*a.buyer_id AS Y,-(a.amount+a.id) AS Z FROM order a"
    );
}

#[test]
fn lone_expression_gets_positional_label() {
    let mut visitor = query(mysql());
    visitor
        .select(&lambda::<Order>(|o| o.amount().max()))
        .unwrap();
    let built = visitor.build_sql().unwrap();
    assert_eq!(built.sql(), "SELECT MAX(a.amount) AS Column0 FROM order a");
    assert_eq!(built.labels(), ["Column0"]);
}

#[test]
fn derived_table_replaces_entity_table() {
    let mut visitor = query(mysql());
    visitor.from_sql("SELECT * FROM order_archive").unwrap();
    visitor.select(&lambda::<Order>(|o| o.id())).unwrap();
    assert_eq!(
        visitor.build_sql().unwrap().sql(),
        "SELECT a.id AS Id FROM (SELECT * FROM order_archive) a"
    );
}

// ==================== Include ====================

fn order_row(id: Value) -> Row {
    Row::new(vec!["Id".into()], vec![id])
}

#[test]
fn include_builds_child_query_for_parent_keys() {
    let mut visitor = query(mysql());
    visitor.include("Details").unwrap();
    let built = visitor.build_sql().unwrap();
    assert!(built.has_include());

    let rows = [
        order_row(Value::Int(1)),
        order_row(Value::Int(2)),
        order_row(Value::Int(1)),
        order_row(Value::Null),
    ];
    let mut includes = built.build_include_sql(&rows).unwrap();
    assert_eq!(includes.len(), 1);
    let include = includes.remove(0);
    assert_eq!(
        include.command.sql,
        "SELECT a.id,a.order_id,a.amount FROM detail a WHERE a.order_id IN (@OrderId_0,@OrderId_1)"
    );
    assert_eq!(include.foreign_key, "OrderId");
    assert_eq!(include.parent_key, "Id");
    assert!(include.is_many);
    assert_eq!(include.command.parameter("@OrderId_1"), Some(&Value::Int(2)));
}

#[test]
fn include_with_no_rows_is_skipped() {
    let mut visitor = query(mysql());
    visitor.include("Details").unwrap();
    let built = visitor.build_sql().unwrap();
    assert!(built.build_include_sql(&[]).unwrap().is_empty());
    assert!(
        built
            .build_include_sql(&[order_row(Value::Null)])
            .unwrap()
            .is_empty()
    );
}

#[test]
fn each_include_gets_its_own_command() {
    let mut visitor = query(mysql());
    visitor.include("Details").unwrap();
    visitor.include("FirstDetail").unwrap();
    let built = visitor.build_sql().unwrap();
    assert_eq!(
        built.included_members().collect::<Vec<_>>(),
        ["Details", "FirstDetail"]
    );

    let includes = built.build_include_sql(&[order_row(Value::Int(4))]).unwrap();
    let members: Vec<_> = includes.iter().map(|i| i.member.as_str()).collect();
    assert_eq!(members, ["Details", "FirstDetail"]);
    assert!(includes[0].is_many);
    assert!(!includes[1].is_many);
    assert_eq!(includes[0].command.sql, includes[1].command.sql);
    assert_eq!(includes[1].command.parameter("@OrderId_0"), Some(&Value::Int(4)));
}

#[test]
fn include_rules() {
    let mut visitor = query(mysql());
    assert!(matches!(
        visitor.include("Amount").unwrap_err(),
        OrmError::InvalidArgument(_)
    ));
    visitor.include("Details").unwrap();
    assert!(matches!(
        visitor.include("Details").unwrap_err(),
        OrmError::InvalidArgument(_)
    ));

    let mut visitor = query(mysql());
    visitor.include("Details").unwrap();
    visitor.select(&lambda::<Order>(|o| o.amount())).unwrap();
    assert!(matches!(
        visitor.build_sql().unwrap_err(),
        OrmError::InvalidArgument(_)
    ));
}

#[test]
fn navigation_member_is_not_a_column() {
    let mut visitor = query(mysql());
    let err = visitor
        .where_(&lambda::<Order>(|o| o.member("Details").eq(1)))
        .unwrap_err();
    assert!(err.is_unsupported());
}
