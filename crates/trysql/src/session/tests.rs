use super::*;
use crate::client::ExecOutcome;
use crate::error::TrySqlError;
use crate::row::{FieldNode, Record, Rows, invalid_field_path};
use crate::testing::{LogCapture, MockDb};
use crate::value::FromValue;

fn mysql(db: &MockDb) -> Session<'_, MockDb> {
    Session::new(db, Dialect::MySql)
}

fn postgres(db: &MockDb) -> Session<'_, MockDb> {
    Session::new(db, Dialect::Postgres)
}

// ==================== Building ====================

#[test]
fn test_select_renders_markers_in_token_order() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["id", "name"])
        .from(["users"])
        .where_("name = #{name}", ("alice",))
        .where_("age > #{age}", (18,))
        .order_by(["id"])
        .limit(10)
        .offset(20);

    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT id, name\nFROM users\nWHERE (name = $1 AND age > $2)\nORDER BY id LIMIT $3 OFFSET $4"
    );
    assert_eq!(
        rendered.params,
        vec![
            Value::from("alice"),
            Value::Int(18),
            Value::UInt(10),
            Value::UInt(20)
        ]
    );
}

#[test]
fn test_dialects_agree_on_argument_positions() {
    let db = MockDb::new();
    let build = |s: &mut Session<'_, MockDb>| {
        s.select(["*"])
            .from(["orders"])
            .add_param("#{status}", "paid")
            .where_("total > #{min}", (100,))
            .or()
            .where_("status = #{status}", ())
            .where_in("region", ["eu", "us"]);
    };

    let mut my = mysql(&db);
    build(&mut my);
    let mut pg = postgres(&db);
    build(&mut pg);

    let my = my.render().unwrap();
    let pg = pg.render().unwrap();
    assert_eq!(
        my.sql,
        "SELECT *\nFROM orders\nWHERE (total > ?) \nOR (status = ? AND region IN (?,?))"
    );
    assert_eq!(
        pg.sql,
        "SELECT *\nFROM orders\nWHERE (total > $1) \nOR (status = $2 AND region IN ($3,$4))"
    );
    assert_eq!(my.params, pg.params);
    assert_eq!(
        my.params,
        vec![
            Value::Int(100),
            Value::from("paid"),
            Value::from("eu"),
            Value::from("us")
        ]
    );
}

#[test]
#[should_panic(expected = "the number of SQL parameters and args must be same")]
fn test_where_argument_count_mismatch_panics() {
    let db = MockDb::new();
    postgres(&db).where_("a = #{a} AND b = #{b}", (1,));
}

#[test]
#[should_panic(expected = "the number of SQL parameters and args must be same")]
fn test_append_raw_argument_count_mismatch_panics() {
    let db = MockDb::new();
    postgres(&db).append_raw("FOR UPDATE", (1,));
}

#[test]
fn test_where_in_empty_adds_nothing() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.select(["*"])
        .from(["t"])
        .where_in("id", Vec::<i64>::new())
        .where_not_in("id", Vec::<i64>::new());
    assert_eq!(s.to_sql(), "SELECT *\nFROM t");
}

#[test]
fn test_where_not_in_uses_auto_tokens() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.select(["*"]).from(["t"]).where_not_in("id", [4, 5]);
    assert_eq!(s.to_sql(), "SELECT *\nFROM t\nWHERE (id NOT IN (#{0},#{1}))");
    assert_eq!(s.param("#{1}"), Some(&Value::Int(5)));
}

#[test]
fn test_auto_tokens_skip_taken_names() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.add_param("#{1}", "named");
    s.select(["*"]).from(["t"]).where_in("id", [7]);
    assert_eq!(s.to_sql(), "SELECT *\nFROM t\nWHERE (id IN (#{2}))");
}

#[test]
fn test_selective_builders_skip_absent_values() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.select(["*"])
        .from(["users u"])
        .inner_join_selective("roles r ON r.id = u.role_id", None::<i64>)
        .where_selective("u.name = #{name}", None::<&str>)
        .where_selective("u.age = #{age}", Some(30));
    assert_eq!(s.to_sql(), "SELECT *\nFROM users u\nWHERE (u.age = #{age})");

    s.reset();
    s.update("users")
        .set_selective("name", Some("bob"))
        .set_selective("email", None::<String>)
        .where_("id = #{id}", (1,));
    assert_eq!(s.to_sql(), "UPDATE users\nSET name = #{name}\nWHERE (id = #{id})");
}

#[test]
fn test_zero_values_can_opt_into_skipping() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.insert_into("users")
        .values("name", "x")
        .values_selective("nickname", Value::from("").non_zero())
        .values_selective("age", Value::from(0).non_zero());
    assert_eq!(s.to_sql(), "INSERT INTO users\n (name)\nVALUES (#{name})");
}

#[test]
fn test_having_binds_value_to_every_token() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["dept"])
        .from(["staff"])
        .group_by(["dept"])
        .having("count(*) > #{n} AND max(age) > #{n}", 2);
    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT dept\nFROM staff\nGROUP BY dept\nHAVING (count(*) > $1 AND max(age) > $2)"
    );
    assert_eq!(rendered.params, vec![Value::Int(2), Value::Int(2)]);
}

#[test]
fn test_multi_row_insert() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    s.insert_into("users")
        .into_columns(["id", "name"])
        .into_multi_values([crate::params![1, "a"], crate::params![2, "b"]]);
    assert_eq!(
        s.to_sql(),
        "INSERT INTO users\n (id, name)\nVALUES (#{0}, #{1})\n, (#{2}, #{3})"
    );
    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "INSERT INTO users\n (id, name)\nVALUES (?, ?)\n, (?, ?)"
    );
    assert_eq!(
        rendered.params,
        vec![
            Value::Int(1),
            Value::from("a"),
            Value::Int(2),
            Value::from("b")
        ]
    );
}

#[test]
fn test_add_row_between_into_values() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.insert_into("tags")
        .into_columns(["name"])
        .into_values(("red",))
        .add_row()
        .into_values(("blue",));
    assert_eq!(
        s.render().unwrap().sql,
        "INSERT INTO tags\n (name)\nVALUES ($1)\n, ($2)"
    );
}

#[test]
fn test_injected_token_for_dynamic_table() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["*"])
        .from(["${table}"])
        .add_param("${table}", "events_2024")
        .where_("id = #{id}", (5,));
    let rendered = s.render().unwrap();
    assert_eq!(rendered.sql, "SELECT *\nFROM events_2024\nWHERE (id = $1)");
    assert_eq!(rendered.params, vec![Value::Int(5)]);
}

#[test]
fn test_append_raw_follows_statement() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["*"])
        .from(["jobs"])
        .where_("state = #{state}", ("queued",))
        .append_raw("FOR UPDATE SKIP LOCKED", ());
    assert_eq!(
        s.render().unwrap().sql,
        "SELECT *\nFROM jobs\nWHERE (state = $1)\nFOR UPDATE SKIP LOCKED"
    );
}

#[test]
fn test_append_rekeys_colliding_tokens() {
    let db = MockDb::new();
    let mut archived = postgres(&db);
    archived.append_raw(
        "UNION ALL SELECT id FROM archived_users WHERE id = #{p0} AND region = ${region}",
        (2, "eu"),
    );

    let mut s = postgres(&db);
    s.select(["id"])
        .from(["users"])
        .where_("id = #{p0}", (1,))
        .add_param("${region}", "eu")
        .append(&archived);

    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT id\nFROM users\nWHERE (id = $1)\n\
         UNION ALL SELECT id FROM archived_users WHERE id = $2 AND region = eu"
    );
    assert_eq!(rendered.params, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(s.param("#{2}"), Some(&Value::Int(2)));
    assert_eq!(archived.param("#{p0}"), Some(&Value::Int(2)));

    let mut my = mysql(&db);
    my.select(["id"])
        .from(["users"])
        .where_("id = #{p0}", (1,))
        .add_param("${region}", "eu")
        .append(&archived);
    assert_eq!(my.render().unwrap().params, rendered.params);
}

#[test]
fn test_append_keeps_auto_tokens_apart() {
    let db = MockDb::new();
    let mut archived = postgres(&db);
    archived.select(["id"]).from(["archived"]).where_in("id", [3]);

    let mut s = postgres(&db);
    s.select(["id"])
        .from(["users"])
        .where_in("id", [1, 2])
        .append_raw("UNION", ())
        .append(&archived);

    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT id\nFROM users\nWHERE (id IN ($1,$2))\nUNION\nSELECT id\nFROM archived\nWHERE (id IN ($3))"
    );
    assert_eq!(
        rendered.params,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

#[test]
fn test_standard_row_window() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["*"]).from(["t"]).offset_rows(40).fetch_first(20);
    let rendered = s.render().unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT *\nFROM t OFFSET $1 ROWS FETCH FIRST $2 ROWS ONLY"
    );
    assert_eq!(rendered.params, vec![Value::UInt(40), Value::UInt(20)]);
}

#[test]
fn test_reset_matches_fresh_session() {
    let db = MockDb::new();
    let build = |s: &mut Session<'_, MockDb>| {
        s.delete_from("users").where_("id = #{id}", (3,));
    };

    let mut reused = mysql(&db);
    reused
        .select(["*"])
        .from(["other"])
        .where_("x = #{x}", (1,))
        .append_raw("LIMIT 1", ())
        .log_sql(true);
    reused.reset();
    build(&mut reused);

    let mut fresh = mysql(&db);
    build(&mut fresh);

    assert_eq!(reused.render().unwrap(), fresh.render().unwrap());
    assert_eq!(reused.param("#{x}"), None);
    assert!(!reused.log_sql);
}

// ==================== Executing ====================

#[derive(Debug, Default, PartialEq)]
struct Base {
    id: i64,
}

impl Record for Base {
    fn fields() -> &'static [FieldNode] {
        static FIELDS: [FieldNode; 1] = [FieldNode::leaf("id", "id")];
        &FIELDS
    }

    fn set_field(&mut self, path: &[usize], value: Value) -> SqlResult<()> {
        match path {
            [0] => self.id = FromValue::from_value(value)?,
            _ => return Err(invalid_field_path("Base", path)),
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct User {
    base: Base,
    name: String,
}

impl Record for User {
    fn fields() -> &'static [FieldNode] {
        static FIELDS: [FieldNode; 2] = [
            FieldNode::branch("base", Base::fields),
            FieldNode::leaf("name", "name"),
        ];
        &FIELDS
    }

    fn set_field(&mut self, path: &[usize], value: Value) -> SqlResult<()> {
        match path {
            [0, rest @ ..] => self.base.set_field(rest, value)?,
            [1] => self.name = FromValue::from_value(value)?,
            _ => return Err(invalid_field_path("User", path)),
        }
        Ok(())
    }
}

fn user_rows() -> Rows {
    Rows::new(["id", "name"])
        .with_row(vec![Value::Int(1), Value::from("alice")])
        .with_row(vec![Value::Int(2), Value::from("bob")])
}

#[tokio::test]
async fn test_execution_resets_session() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.update("users")
        .set("name", "carol")
        .where_("id = #{id}", (7,));
    s.execute().await.unwrap();

    assert_eq!(s.to_sql(), "");
    assert_eq!(s.param("#{id}"), None);
    let call = db.last_call().unwrap();
    assert_eq!(call.sql, "UPDATE users\nSET name = $1\nWHERE (id = $2)");
    assert_eq!(call.params, vec![Value::from("carol"), Value::Int(7)]);
}

#[tokio::test]
async fn test_render_failure_still_resets() {
    let db = MockDb::new();
    let mut s = postgres(&db);
    s.select(["*"]).from(["t"]).where_("id = #{id}", ());
    let err = s.execute().await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(s.to_sql(), "");
    assert!(db.calls().is_empty());
}

#[tokio::test]
async fn test_rows_affected_requires_bound_predicate() {
    let db = MockDb::new().with_outcome(ExecOutcome {
        rows_affected: 3,
        last_insert_id: None,
    });
    let mut s = mysql(&db);

    s.delete_from("users");
    let err = s.execute_for_rows_affected().await.unwrap_err();
    assert!(err.is_validation());
    assert!(db.calls().is_empty());
    assert_eq!(s.to_sql(), "");

    s.delete_from("users").where_("1 = 1", ());
    assert!(s.execute_for_rows_affected().await.is_err());

    s.delete_from("users").where_in("id", [1, 2, 3]);
    assert_eq!(s.execute_for_rows_affected().await.unwrap(), 3);
    assert_eq!(db.calls().len(), 1);
}

#[tokio::test]
async fn test_generated_id_mysql_uses_last_insert_id() {
    let db = MockDb::new().with_outcome(ExecOutcome {
        rows_affected: 1,
        last_insert_id: Some(42),
    });
    let mut s = mysql(&db);
    s.insert_into("users").values("name", "dave");
    assert_eq!(s.execute_for_generated_id("id").await.unwrap(), 42);
    assert_eq!(
        db.last_call().unwrap().sql,
        "INSERT INTO users\n (name)\nVALUES (?)"
    );
}

#[tokio::test]
async fn test_generated_id_postgres_appends_returning() {
    let db = MockDb::new().with_rows(Rows::new(["id"]).with_row(vec![Value::Int(99)]));
    let mut s = postgres(&db);
    s.insert_into("users").values("name", "erin");
    assert_eq!(s.execute_for_generated_id("id").await.unwrap(), 99);
    assert_eq!(
        db.last_call().unwrap().sql,
        "INSERT INTO users\n (name)\nVALUES ($1)\n RETURNING id"
    );
}

#[tokio::test]
async fn test_as_record_decodes_promoted_fields() {
    let db = MockDb::new().with_rows(user_rows());
    let mut s = mysql(&db);
    let user: User = s
        .select(["id", "name"])
        .from(["users"])
        .as_record()
        .await
        .unwrap();
    assert_eq!(
        user,
        User {
            base: Base { id: 1 },
            name: "alice".into()
        }
    );
}

#[tokio::test]
async fn test_as_record_on_empty_result_is_not_found() {
    let db = MockDb::new();
    let mut s = mysql(&db);
    let err = s
        .select(["*"])
        .from(["users"])
        .as_record::<User>()
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let none = s
        .select(["*"])
        .from(["users"])
        .as_record_opt::<User>()
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_as_record_list_with_boxed_elements() {
    let db = MockDb::new().with_rows(user_rows());
    let mut s = mysql(&db);
    let users: Vec<Box<User>> = s
        .select(["*"])
        .from(["users"])
        .as_record_list()
        .await
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].base.id, 2);
}

#[tokio::test]
async fn test_scalars() {
    let db = MockDb::new()
        .with_rows(Rows::new(["count"]).with_row(vec![Value::Int(12)]))
        .with_rows(
            Rows::new(["name"])
                .with_row(vec![Value::from("a")])
                .with_row(vec![Value::from("b")]),
        )
        .with_rows(Rows::new(["name"]).with_row(vec![Value::from("x")]));
    let mut s = postgres(&db);

    let count: i64 = s
        .select(["count(*)"])
        .from(["users"])
        .as_scalar()
        .await
        .unwrap();
    assert_eq!(count, 12);

    let names: Vec<String> = s
        .select(["name"])
        .from(["users"])
        .as_scalar_list()
        .await
        .unwrap();
    assert_eq!(names, vec!["a", "b"]);

    let err = s
        .select(["name"])
        .from(["users"])
        .as_scalar::<i64>()
        .await
        .unwrap_err();
    assert!(matches!(err, TrySqlError::Decode { .. }));

    let missing = s
        .select(["name"])
        .from(["users"])
        .as_scalar_opt::<String>()
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_maps_keep_native_values() {
    let db = MockDb::new().with_rows(user_rows()).with_rows(user_rows());
    let mut s = mysql(&db);

    let first = s.select(["*"]).from(["users"]).as_map().await.unwrap();
    assert_eq!(first["id"], Value::Int(1));

    let all = s.select(["*"]).from(["users"]).as_map_list().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1]["name"], Value::from("bob"));

    let err = s.select(["*"]).from(["users"]).as_map().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_slow_call() {
    let db = MockDb::new().with_delay(Duration::from_secs(5));
    let mut s = mysql(&db);
    s.with_timeout(Duration::from_secs(1));
    let err = s
        .select(["sleep(5)"])
        .as_scalar::<i64>()
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_statement_timeout_from_options() {
    let db = MockDb::new().with_delay(Duration::from_millis(50));
    let options = SessionOptions {
        statement_timeout: Some(Duration::from_millis(10)),
        ..SessionOptions::default()
    };
    let mut s = Session::with_options(&db, Dialect::Postgres, options);
    let err = s
        .delete_from("t")
        .where_("id = #{id}", (1,))
        .execute()
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

// ==================== SQL logging ====================

#[tokio::test]
async fn test_log_sql_emits_before_the_driver_call() {
    let capture = LogCapture::default();
    let _guard = capture.install();
    let db = MockDb::new().failing_calls();
    let mut s = mysql(&db);

    s.log_sql(true)
        .update("users")
        .set("name", "erin")
        .where_("id = #{id}", (7,));
    assert!(s.execute().await.is_err());

    let events = capture.events("trysql.sql");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].field("sql"),
        Some("UPDATE users\nSET name = ?\nWHERE (id = ?)")
    );
    assert_eq!(events[0].field("params"), Some("erin(String),7(i64)"));
    assert_eq!(events[0].field("param_count"), Some("2"));
    assert_eq!(db.calls().len(), 1);

    // reset turned logging back off
    s.update("users")
        .set("name", "erin")
        .where_("id = #{id}", (7,));
    assert!(s.execute().await.is_err());
    assert_eq!(capture.events("trysql.sql").len(), 1);
    assert_eq!(db.calls().len(), 2);
}

#[tokio::test]
async fn test_log_default_comes_from_options() {
    let capture = LogCapture::default();
    let _guard = capture.install();
    let db = MockDb::new();

    let mut quiet = postgres(&db);
    quiet.delete_from("t").where_("id = #{id}", (1,));
    quiet.execute().await.unwrap();
    assert!(capture.events("trysql.sql").is_empty());

    let options = SessionOptions {
        log_sql: true,
        ..SessionOptions::default()
    };
    let mut s = Session::with_options(&db, Dialect::Postgres, options);
    s.delete_from("t").where_("id = #{id}", (2,));
    s.execute().await.unwrap();

    s.log_sql(false).delete_from("t").where_("id = #{id}", (3,));
    s.execute().await.unwrap();

    s.delete_from("t").where_("id = #{id}", (4,));
    s.execute().await.unwrap();

    let events = capture.events("trysql.sql");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].field("sql"), Some("DELETE FROM t\nWHERE (id = $1)"));
    assert_eq!(events[0].field("params"), Some("2(i64)"));
    assert_eq!(events[1].field("params"), Some("4(i64)"));
}
