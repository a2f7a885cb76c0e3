//! Statement and cursor behavior over a scripted transport.

mod common;

use common::{connect_scripted, ServerScript};
use pgline::{Error, PgValue, ToPgText};

#[test]
fn prepare_captures_parameter_oids_and_columns() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[25, 1082])
            .row_description(&[("city", 25), ("temp_lo", 23)])
            .ready(b'I'),
    );

    let stmt = conn
        .prepare("SELECT city, temp_lo FROM weather WHERE city = $1 AND date = $2")
        .unwrap();
    assert_eq!(stmt.name(), "stmt_0");
    assert_eq!(stmt.parameter_oids(), &[25, 1082]);
    let columns = stmt.columns().unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].name, "city");
    assert_eq!(columns[1].type_oid, 23);
}

#[test]
fn prepare_statement_names_are_unique() {
    let script = ServerScript::new()
        .parse_complete()
        .parameter_description(&[])
        .no_data()
        .ready(b'I')
        .parse_complete()
        .parameter_description(&[])
        .no_data()
        .ready(b'I');
    let (mut conn, probe) = connect_scripted(script);

    let first = conn.prepare("DELETE FROM weather").unwrap();
    let second = conn.prepare("DELETE FROM weather").unwrap();
    assert_eq!(first.name(), "stmt_0");
    assert_eq!(second.name(), "stmt_1");
    assert!(probe.written_contains(b"stmt_0\0"));
    assert!(probe.written_contains(b"stmt_1\0"));
}

#[test]
fn execute_streams_typed_rows() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[("city", 25), ("temp_lo", 23), ("prcp", 1700)])
            .ready(b'I')
            .bind_complete()
            .data_row(&[Some("San Francisco"), Some("46"), Some("0.25")])
            .data_row(&[Some("Hayward"), Some("37"), None])
            .command_complete("SELECT 2")
            .ready(b'I'),
    );

    let stmt = conn
        .prepare("SELECT city, temp_lo, prcp FROM weather ORDER BY city")
        .unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();
    assert!(cursor.row_count().is_none());

    let row = cursor.next_row().unwrap().unwrap();
    assert_eq!(row[0].string().unwrap(), "San Francisco");
    assert_eq!(row[1].int().unwrap(), 46);
    assert_eq!(
        row[2].decimal().unwrap().to_pg_text().unwrap(),
        "0.25".to_string()
    );

    let row = cursor.next_row().unwrap().unwrap();
    assert_eq!(row[0].string().unwrap(), "Hayward");
    assert_eq!(row[2].opt_int().unwrap(), None);

    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(2));
    assert!(cursor.is_drained());
    // exhausted cursors keep returning None
    assert!(cursor.next_row().is_none());
}

#[test]
fn rows_are_read_lazily() {
    let script = ServerScript::new()
        .parse_complete()
        .parameter_description(&[])
        .row_description(&[("n", 23)])
        .ready(b'I')
        .bind_complete();
    let first_row = ServerScript::new().data_row(&[Some("1")]);
    let tail = ServerScript::new()
        .data_row(&[Some("2")])
        .data_row(&[Some("3")])
        .command_complete("SELECT 3")
        .ready(b'I');

    let bind_complete_end;
    let first_row_end;
    let script = {
        let head = script.build();
        bind_complete_end = head.len();
        let first = first_row.build();
        first_row_end = bind_complete_end + first.len();
        ServerScript::new().raw(&head).raw(&first).raw(&tail.build())
    };

    let (mut conn, probe) = connect_scripted(script);
    let startup_consumed = probe.consumed();

    let stmt = conn.prepare("SELECT n FROM series").unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();

    // after execute, only BindComplete has been consumed
    assert_eq!(probe.consumed() - startup_consumed, bind_complete_end);

    // one next() consumes exactly one DataRow frame
    cursor.next_row().unwrap().unwrap();
    assert_eq!(probe.consumed() - startup_consumed, first_row_end);

    drop(cursor);
}

#[test]
fn dml_without_result_set_drains_immediately() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[25])
            .no_data()
            .ready(b'I')
            .bind_complete()
            .command_complete("INSERT 0 1")
            .ready(b'I'),
    );

    let stmt = conn
        .prepare("INSERT INTO weather (city) VALUES ($1)")
        .unwrap();
    assert!(stmt.columns().is_none());

    let mut cursor = conn.execute(&stmt, &("Berkeley",)).unwrap();
    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(1));
}

#[test]
fn empty_statement_yields_no_rows_and_no_error() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .no_data()
            .ready(b'I')
            .bind_complete()
            .empty_query()
            .ready(b'I'),
    );

    let stmt = conn.prepare("").unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();
    assert!(cursor.next_row().is_none());
    assert!(cursor.row_count().is_none());
}

#[test]
fn metadata_is_present_only_when_requested() {
    let script = ServerScript::new()
        .parse_complete()
        .parameter_description(&[])
        .row_description(&[("city", 25)])
        .ready(b'I')
        // execute without metadata
        .bind_complete()
        .command_complete("SELECT 0")
        .ready(b'I')
        // execute with metadata
        .bind_complete()
        .row_description(&[("city", 25)])
        .command_complete("SELECT 0")
        .ready(b'I');
    let (mut conn, _probe) = connect_scripted(script);

    let stmt = conn.prepare("SELECT city FROM weather WHERE false").unwrap();

    let mut cursor = conn.execute(&stmt, &()).unwrap();
    assert!(cursor.columns().is_none());
    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(0));
    drop(cursor);

    let mut cursor = conn.execute_with_metadata(&stmt, &()).unwrap();
    let columns = cursor.columns().unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].name, "city");
    assert_eq!(columns[0].type_oid, 25);
    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(0));
}

#[test]
fn mid_stream_error_is_returned_once_and_session_recovers() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[("n", 23)])
            .ready(b'I')
            .bind_complete()
            .data_row(&[Some("1")])
            .error("ERROR", "22012", "division by zero")
            .ready(b'I')
            // the session stays usable afterwards
            .bind_complete()
            .data_row(&[Some("1")])
            .command_complete("SELECT 1")
            .ready(b'I'),
    );

    let stmt = conn.prepare("SELECT 1/n FROM series").unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();

    assert!(cursor.next_row().unwrap().is_ok());
    let err = cursor.next_row().unwrap().unwrap_err();
    assert_eq!(err.sqlstate(), Some("22012"));
    // the error is yielded exactly once
    assert!(cursor.next_row().is_none());
    drop(cursor);

    assert!(!conn.is_broken());
    let mut cursor = conn.execute(&stmt, &()).unwrap();
    assert!(cursor.next_row().unwrap().is_ok());
    assert!(cursor.next_row().is_none());
}

#[test]
fn bind_error_resynchronizes_before_returning() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[23])
            .no_data()
            .ready(b'I')
            .error("ERROR", "22P02", "invalid input syntax for type integer")
            .ready(b'I')
            .command_complete("SELECT 0")
            .ready(b'I'),
    );

    let stmt = conn.prepare("DELETE FROM weather WHERE temp_lo = $1").unwrap();
    let err = conn.execute(&stmt, &("not-a-number",)).unwrap_err();
    assert_eq!(err.sqlstate(), Some("22P02"));

    // one ReadyForQuery per Sync: the connection is usable again
    assert_eq!(conn.batch_execute("SELECT 1 WHERE false").unwrap(), Some(0));
}

#[test]
fn dropping_an_unfinished_cursor_closes_the_portal() {
    let (mut conn, probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[("n", 23)])
            .ready(b'I')
            .bind_complete()
            .data_row(&[Some("1")])
            .data_row(&[Some("2")])
            .data_row(&[Some("3")])
            .command_complete("SELECT 3")
            .ready(b'I')
            // responses to Close(portal) + Sync
            .close_complete()
            .ready(b'I')
            // the session stays usable
            .command_complete("SELECT 0")
            .ready(b'I'),
    );

    let stmt = conn.prepare("SELECT n FROM series").unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();
    cursor.next_row().unwrap().unwrap();
    drop(cursor); // two rows unread

    // Close('P') for the unnamed portal went out
    assert!(probe.written_contains(&[b'C', 0, 0, 0, 6, b'P', 0]));
    assert_eq!(conn.batch_execute("SELECT 1 WHERE false").unwrap(), Some(0));
}

#[test]
fn too_many_parameters_never_touch_the_wire() {
    let (mut conn, probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .no_data()
            .ready(b'I'),
    );

    let stmt = conn.prepare("SELECT 1").unwrap();
    let written_before = probe.written_len();

    let params: Vec<i64> = (0..65536).collect();
    let err = conn.execute(&stmt, &params).unwrap_err();
    assert!(matches!(err, Error::TooManyParameters(65536)));
    assert_eq!(probe.written_len(), written_before);

    // 65535 is still within range (the script has no response for it, so
    // just check the error is not TooManyParameters)
    let params: Vec<i64> = (0..65535).collect();
    let err = conn.execute(&stmt, &params).unwrap_err();
    assert!(!matches!(err, Error::TooManyParameters(_)));
}

#[test]
fn statement_close_is_idempotent() {
    let (mut conn, probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .no_data()
            .ready(b'I')
            .close_complete()
            .ready(b'I'),
    );

    let mut stmt = conn.prepare("SELECT 1").unwrap();
    conn.close_statement(&mut stmt).unwrap();
    assert!(stmt.is_closed());
    let written_after_close = probe.written_len();

    // closing again is a no-op, on the wire too
    conn.close_statement(&mut stmt).unwrap();
    assert_eq!(probe.written_len(), written_after_close);

    // executing a closed statement is refused without touching the wire
    let err = conn.execute(&stmt, &()).unwrap_err();
    assert!(matches!(err, Error::StatementClosed));
    assert_eq!(probe.written_len(), written_after_close);
}

#[test]
fn statements_are_bound_to_their_connection() {
    let (mut conn_a, _probe_a) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .no_data()
            .ready(b'I'),
    );
    let (mut conn_b, _probe_b) = connect_scripted(ServerScript::new());

    let stmt = conn_a.prepare("SELECT 1").unwrap();
    let err = conn_b.execute(&stmt, &()).unwrap_err();
    assert!(matches!(err, Error::StatementClosed));
}

#[test]
fn fetch_loop_resynchronizes_between_statements() {
    // DECLARE ... CURSOR, then FETCH FORWARD 2 until a fetch returns 0 rows
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            // DECLARE via simple query
            .command_complete("DECLARE CURSOR")
            .ready(b'I')
            // prepare the FETCH statement
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[("n", 23)])
            .ready(b'I')
            // first fetch: two rows
            .bind_complete()
            .data_row(&[Some("1")])
            .data_row(&[Some("2")])
            .command_complete("FETCH 2")
            .ready(b'I')
            // second fetch: two rows
            .bind_complete()
            .data_row(&[Some("3")])
            .data_row(&[Some("4")])
            .command_complete("FETCH 2")
            .ready(b'I')
            // third fetch: empty
            .bind_complete()
            .command_complete("FETCH 0")
            .ready(b'I'),
    );

    conn.batch_execute("DECLARE wc CURSOR WITH HOLD FOR SELECT n FROM series")
        .unwrap();
    let stmt = conn.prepare("FETCH FORWARD 2 FROM wc").unwrap();

    let mut total = 0;
    loop {
        let mut cursor = conn.execute(&stmt, &()).unwrap();
        let mut batch = 0;
        for row in &mut cursor {
            row.unwrap();
            batch += 1;
        }
        assert_eq!(cursor.row_count(), Some(batch));
        drop(cursor);
        if batch == 0 {
            break;
        }
        total += batch;
    }
    assert_eq!(total, 4);
}

#[test]
fn weather_round_trip() {
    // condensed version of the tutorial scenario: insert parameterized rows
    // in a transaction, select them back, update, then delete
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .command_complete("CREATE TABLE")
            .ready(b'I')
            // prepare INSERT
            .parse_complete()
            .parameter_description(&[25, 23, 23, 1700, 1082])
            .no_data()
            .ready(b'I')
            // BEGIN
            .command_complete("BEGIN")
            .ready(b'T')
            // two inserts
            .bind_complete()
            .command_complete("INSERT 0 1")
            .ready(b'T')
            .bind_complete()
            .command_complete("INSERT 0 1")
            .ready(b'T')
            // COMMIT
            .command_complete("COMMIT")
            .ready(b'I')
            // prepare SELECT
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[
                ("city", 25),
                ("temp_lo", 23),
                ("temp_hi", 23),
                ("prcp", 1700),
                ("date", 1082),
            ])
            .ready(b'I')
            .bind_complete()
            .data_row(&[
                Some("Hayward"),
                Some("37"),
                Some("54"),
                None,
                Some("1994-11-29"),
            ])
            .data_row(&[
                Some("San Francisco"),
                Some("46"),
                Some("50"),
                Some("0.25"),
                Some("1994-11-27"),
            ])
            .command_complete("SELECT 2")
            .ready(b'I')
            // prepare DELETE, execute
            .parse_complete()
            .parameter_description(&[25])
            .no_data()
            .ready(b'I')
            .bind_complete()
            .command_complete("DELETE 2")
            .ready(b'I'),
    );

    conn.batch_execute(
        "CREATE TABLE weather (city text, temp_lo int, temp_hi int, prcp numeric, date date)",
    )
    .unwrap();

    let insert = conn
        .prepare("INSERT INTO weather VALUES ($1, $2, $3, $4, $5)")
        .unwrap();
    assert_eq!(insert.parameter_oids(), &[25, 23, 23, 1700, 1082]);

    conn.batch_execute("BEGIN").unwrap();
    for (city, lo, hi, prcp, date) in [
        ("Hayward", 37_i32, 54_i32, None::<&str>, "1994-11-29"),
        ("San Francisco", 46, 50, Some("0.25"), "1994-11-27"),
    ] {
        let mut cursor = conn
            .execute(&insert, &(city, lo, hi, prcp, date))
            .unwrap();
        assert!(cursor.next_row().is_none());
        assert_eq!(cursor.row_count(), Some(1));
    }
    conn.batch_execute("COMMIT").unwrap();

    let select = conn
        .prepare("SELECT city, temp_lo, temp_hi, prcp, date FROM weather ORDER BY date")
        .unwrap();
    let mut cursor = conn.execute(&select, &()).unwrap();
    let rows: Vec<_> = (&mut cursor).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(cursor.row_count(), Some(2));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0].string().unwrap(), "Hayward");
    assert!(rows[0][3].is_null());
    assert_eq!(
        rows[1][4].date().unwrap().to_string(),
        "1994-11-27".to_string()
    );
    drop(cursor);

    let delete = conn.prepare("DELETE FROM weather WHERE city <> $1").unwrap();
    let mut cursor = conn.execute(&delete, &("nowhere",)).unwrap();
    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(2));
}

#[test]
fn update_reports_count_and_select_sees_new_values() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            // prepare UPDATE
            .parse_complete()
            .parameter_description(&[25, 1082])
            .no_data()
            .ready(b'I')
            .bind_complete()
            .command_complete("UPDATE 1")
            .ready(b'I')
            // prepare SELECT, values shifted by one
            .parse_complete()
            .parameter_description(&[25])
            .row_description(&[("temp_lo", 23), ("temp_hi", 23)])
            .ready(b'I')
            .bind_complete()
            .data_row(&[Some("36"), Some("55")])
            .command_complete("SELECT 1")
            .ready(b'I'),
    );

    let update = conn
        .prepare(
            "UPDATE weather SET temp_lo = temp_lo - 1, temp_hi = temp_hi + 1 \
             WHERE city = $1 AND date = $2",
        )
        .unwrap();
    let mut cursor = conn
        .execute(&update, &("Hayward", "1994-11-29"))
        .unwrap();
    assert!(cursor.next_row().is_none());
    assert_eq!(cursor.row_count(), Some(1));
    drop(cursor);

    let select = conn
        .prepare("SELECT temp_lo, temp_hi FROM weather WHERE city = $1")
        .unwrap();
    let mut cursor = conn.execute(&select, &("Hayward",)).unwrap();
    let row = cursor.next_row().unwrap().unwrap();
    assert_eq!(row[0].int().unwrap(), 36);
    assert_eq!(row[1].int().unwrap(), 55);
    assert!(cursor.next_row().is_none());
}

#[test]
fn null_parameters_are_encoded_as_null() {
    let (mut conn, probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[25])
            .no_data()
            .ready(b'I')
            .bind_complete()
            .command_complete("INSERT 0 1")
            .ready(b'I'),
    );

    let stmt = conn.prepare("INSERT INTO weather (city) VALUES ($1)").unwrap();
    let mut cursor = conn.execute(&stmt, &(Option::<String>::None,)).unwrap();
    assert!(cursor.next_row().is_none());
    drop(cursor);

    // one parameter, encoded with length -1
    let needle = [&1_i16.to_be_bytes()[..], &(-1_i32).to_be_bytes()[..]].concat();
    assert!(probe.written_contains(&needle));
}

#[test]
fn conversion_errors_do_not_poison_anything() {
    let (mut conn, _probe) = connect_scripted(
        ServerScript::new()
            .parse_complete()
            .parameter_description(&[])
            .row_description(&[("n", 23)])
            .ready(b'I')
            .bind_complete()
            .data_row(&[Some("not-a-number")])
            .data_row(&[Some("5")])
            .command_complete("SELECT 2")
            .ready(b'I'),
    );

    let stmt = conn.prepare("SELECT n FROM series").unwrap();
    let mut cursor = conn.execute(&stmt, &()).unwrap();

    let row = cursor.next_row().unwrap().unwrap();
    assert!(matches!(
        row[0].int().unwrap_err(),
        Error::ValueConversion { .. }
    ));
    // the raw value is still available, the cursor keeps streaming
    assert_eq!(row[0].raw(), Some("not-a-number"));
    assert_eq!(cursor.next_row().unwrap().unwrap()[0].int().unwrap(), 5);
    assert!(cursor.next_row().is_none());
    drop(cursor);
    assert!(!conn.is_broken());
}

// keep PgValue in the public surface exercised
#[test]
fn values_can_be_built_directly() {
    assert!(PgValue::null().is_null());
    assert_eq!(PgValue::from_text("11").int().unwrap(), 11);
}
