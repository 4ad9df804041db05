use super::*;
use crate::expr::{Operator, Predicate, WhereExpr};

fn users() -> QueryBuilder {
    QueryBuilder::table(Dialect::MySql, "users")
}

#[test]
fn test_select_columns_with_where() {
    let sql = users()
        .select(["username", "password"])
        .where_eq("id", 1)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `users`.`username`, `users`.`password` FROM `users` WHERE `users`.`id` = '1'"
    );
}

#[test]
fn test_or_where() {
    let sql = users()
        .where_eq("name", 2)
        .or_where_eq("name", 3)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE `users`.`name` = '2' OR `users`.`name` = '3'"
    );
}

#[test]
fn test_first_predicate_has_no_connector() {
    let sql = users().or_where_eq("name", 2).to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`name` = '2'");

    let sql = users().or_where_null("deleted_at").to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`deleted_at` IS NULL");
}

#[test]
fn test_sum_aggregate() {
    assert_eq!(
        users().sum("age").to_sql().unwrap(),
        "SELECT SUM(`users`.`age`) AS age FROM `users`"
    );
}

#[test]
fn test_count_star_is_not_qualified() {
    assert_eq!(
        users().count("*").to_sql().unwrap(),
        "SELECT COUNT(*) AS count FROM `users`"
    );
    assert_eq!(
        users().max("age as oldest").to_sql().unwrap(),
        "SELECT MAX(`users`.`age`) AS oldest FROM `users`"
    );
}

#[test]
fn test_empty_where_in() {
    let empty: Vec<i64> = Vec::new();
    assert_eq!(
        users().where_in("age", empty).to_sql().unwrap(),
        "SELECT * FROM `users` WHERE 0 = 1"
    );
}

#[test]
fn test_limit_offset() {
    assert_eq!(
        users().limit(10).offset(10).to_sql().unwrap(),
        "SELECT * FROM `users` LIMIT 10 OFFSET 10"
    );
    assert_eq!(
        users().for_page(3, 15).to_sql().unwrap(),
        "SELECT * FROM `users` LIMIT 15 OFFSET 30"
    );
    assert_eq!(
        users().take(2).skip(4).to_sql().unwrap(),
        "SELECT * FROM `users` LIMIT 2 OFFSET 4"
    );
}

#[test]
fn test_invalid_operator_is_recorded() {
    let query = users().where_op("id", "~~", 1).where_eq("name", "x");
    let err = query.to_sql().unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("~~"));
    assert!(query.to_qmark().unwrap_err().is_validation());
}

#[test]
fn test_operators_are_case_insensitive() {
    let sql = users().where_op("name", "NOT LIKE", "a%").to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`name` NOT LIKE 'a%'");

    let sql = users().where_op("name", "regexp", "^a").to_sql().unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`name` REGEXP '^a'");
}

#[test]
fn test_null_comparisons_become_is_null() {
    assert_eq!(
        users().where_eq("email", Value::Null).to_sql().unwrap(),
        "SELECT * FROM `users` WHERE `users`.`email` IS NULL"
    );
    assert_eq!(
        users().where_op("email", "<>", Value::Null).to_sql().unwrap(),
        "SELECT * FROM `users` WHERE `users`.`email` IS NOT NULL"
    );
}

#[test]
fn test_where_group() {
    let sql = users()
        .where_eq("active", 1)
        .where_group(|q| q.where_eq("role", "admin").or_where_eq("role", "editor"))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE `users`.`active` = '1' AND \
         (`users`.`role` = 'admin' OR `users`.`role` = 'editor')"
    );
}

#[test]
fn test_empty_group_is_skipped() {
    let sql = users()
        .where_group(|q| q)
        .where_eq("id", 1)
        .to_sql()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`id` = '1'");
}

#[test]
fn test_where_exists() {
    let orders = QueryBuilder::table(Dialect::MySql, "orders").where_column("user_id", "=", "users.id");
    let sql = users().where_exists(orders).to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE EXISTS \
         (SELECT * FROM `orders` WHERE `orders`.`user_id` = `users`.`id`)"
    );
}

#[test]
fn test_between_and_not_between() {
    let sql = users()
        .where_between("age", 18, 30)
        .where_not_between("score", 1, 2)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE `users`.`age` BETWEEN '18' AND '30' AND \
         `users`.`score` NOT BETWEEN '1' AND '2'"
    );
}

#[test]
fn test_where_raw_checks_bindings() {
    let compiled = users()
        .where_raw("age > ? and age < ?", vec![Value::from(18), Value::from(30)])
        .to_qmark()
        .unwrap();
    assert_eq!(compiled.sql, "SELECT * FROM `users` WHERE age > ? and age < ?");
    assert_eq!(compiled.bindings.len(), 2);

    let err = users()
        .where_raw("age > ? and age < ?", vec![Value::from(18)])
        .to_sql()
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_select_alias_distinct_and_order() {
    let sql = users()
        .distinct()
        .select(["name as n", "email"])
        .order_by("name desc, email")
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT DISTINCT `users`.`name` AS `n`, `users`.`email` FROM `users` \
         ORDER BY `users`.`name` DESC, `users`.`email` ASC"
    );
}

#[test]
fn test_group_by_having() {
    let sql = users()
        .select(["status"])
        .count("*")
        .group_by("status")
        .having("count", ">", 5)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `users`.`status`, COUNT(*) AS count FROM `users` \
         GROUP BY `users`.`status` HAVING `count` > '5'"
    );
}

#[test]
fn test_select_subquery() {
    let posts = QueryBuilder::table(Dialect::MySql, "posts")
        .count("*")
        .where_column("posts.user_id", "=", "users.id");
    let sql = users()
        .select(["name"])
        .add_select_sub(posts, "post_count")
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `users`.`name`, (SELECT COUNT(*) AS count FROM `posts` \
         WHERE `posts`.`user_id` = `users`.`id`) AS `post_count` FROM `users`"
    );
}

#[test]
fn test_join_variants() {
    let sql = users()
        .left_join("contacts", "users.id", "=", "contacts.user_id")
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` LEFT JOIN `contacts` ON `users`.`id` = `contacts`.`user_id`"
    );

    let sql = users()
        .join_using("contacts as c", JoinKind::Left, |j| {
            j.on("users.id", Operator::Eq, "c.user_id")
                .on_value("c.kind", Operator::Eq, "email")
        })
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` LEFT JOIN `contacts` AS `c` ON `users`.`id` = `c`.`user_id` \
         AND `c`.`kind` = 'email'"
    );

    let err = users()
        .join("contacts", "users.id", "=>", "contacts.user_id")
        .to_sql()
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_to_qmark_is_pure() {
    let query = users().where_eq("id", 1);
    let first = query.to_qmark().unwrap();
    let second = query.to_qmark().unwrap();
    assert_eq!(first, second);
    assert_eq!(query.to_sql().unwrap(), "SELECT * FROM `users` WHERE `users`.`id` = '1'");
}

#[test]
fn test_reset_and_clone_templates() {
    let template = users().select(["id"]);
    let a = template.clone().where_eq("id", 1).to_sql().unwrap();
    let b = template.clone().where_eq("id", 2).to_sql().unwrap();
    assert_ne!(a, b);
    assert_eq!(template.to_sql().unwrap(), "SELECT `users`.`id` FROM `users`");

    let cleared = users()
        .where_op("id", "??", 1)
        .order_by("name")
        .limit(3)
        .reset();
    assert_eq!(cleared.to_sql().unwrap(), "SELECT * FROM `users`");
}

#[test]
fn test_when() {
    let filter: Option<&str> = None;
    let sql = users()
        .when(filter.is_some(), |q| q.where_eq("name", filter.unwrap_or_default()))
        .when(true, |q| q.where_eq("active", 1))
        .to_sql()
        .unwrap();
    assert_eq!(sql, "SELECT * FROM `users` WHERE `users`.`active` = '1'");
}

#[test]
fn test_macros_and_local_scopes() {
    let query = users()
        .register_macro("active", |q, _| q.where_eq("active", true))
        .register_scope("of_age", |q, args| {
            let age = args.first().cloned().unwrap_or(Value::Int(18));
            q.where_op("age", ">=", age)
        });

    assert_eq!(
        query.clone().call_macro("active", &[]).to_sql().unwrap(),
        "SELECT * FROM `users` WHERE `users`.`active` = '1'"
    );
    assert_eq!(
        query
            .clone()
            .call_scope("of_age", &[Value::from(21)])
            .to_sql()
            .unwrap(),
        "SELECT * FROM `users` WHERE `users`.`age` >= '21'"
    );

    let err = query.call_macro("missing", &[]).to_sql().unwrap_err();
    assert!(matches!(err, QuarryError::Usage(_)));
}

#[test]
fn test_where_expr_and_key() {
    let sql = users()
        .primary_key("user_id")
        .where_key(7)
        .where_expr(WhereExpr::or(Predicate::Null {
            column: "banned_at".to_string(),
            negated: true,
        }))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE `users`.`user_id` = '7' OR `users`.`banned_at` IS NOT NULL"
    );
}

#[test]
fn test_missing_table_is_usage_error() {
    let err = QueryBuilder::new(Dialect::MySql).to_sql().unwrap_err();
    assert!(matches!(err, QuarryError::Usage(_)));
}

#[test]
fn test_table_metadata_factory() {
    let posts = Table::new("posts").primary_key("post_id").dialect(Dialect::Sqlite);
    let sql = new_query(&posts).where_key(3).to_sql().unwrap();
    assert_eq!(sql, r#"SELECT * FROM "posts" WHERE "posts"."post_id" = '3'"#);
}
