//! End-to-end protocol scenarios against an `httpmock::MockServer` standing in for the
//! coordinator, driving the real `RequestLayer`/`Query` exactly as a caller would.

use std::sync::Arc;

use httpmock::MockServer;
use serde_json::json;
use trino_client_core::redirect::IdentityRedirectHandler;
use trino_client_core::{Query, RequestLayerBuilder};

fn layer(server: &MockServer) -> Arc<trino_client_core::RequestLayer> {
    Arc::new(
        RequestLayerBuilder::new(server.host(), server.port(), "alice")
            .max_attempts(3)
            .build()
            .expect("layer should build against a plain-HTTP mock server"),
    )
}

#[test]
fn simple_select_one_page() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q1",
            "stats": {},
            "infoUri": "/i",
            "data": [[1], [2]],
            "columns": [{"name": "c", "type": "bigint", "typeSignature": {"rawType": "bigint", "arguments": []}}],
        }));
    });

    let mut query = Query::new(layer(&server), "select * from t");
    query.execute().unwrap();
    let rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(rows, vec![vec![json!(1)], vec![json!(2)]]);
    assert!(query.is_finished());
    assert_eq!(mock.hits(), 1);
}

#[test]
fn two_page_result_issues_exactly_one_get() {
    let server = MockServer::start();
    let post_mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q2",
            "stats": {},
            "infoUri": "/i",
            "nextUri": server.url("/v1/statement/q2/2"),
            "data": [[1]],
            "columns": [{"name": "c", "type": "bigint", "typeSignature": {"rawType": "bigint", "arguments": []}}],
        }));
    });
    let get_mock = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/v1/statement/q2/2");
        then.status(200).json_body(json!({
            "id": "q2",
            "stats": {},
            "infoUri": "/i",
            "data": [[2]],
        }));
    });

    let mut query = Query::new(layer(&server), "select * from t");
    query.execute().unwrap();
    let rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(rows, vec![vec![json!(1)], vec![json!(2)]]);
    assert_eq!(post_mock.hits(), 1);
    assert_eq!(get_mock.hits(), 1);
}

#[test]
fn session_mutation_round_trips_into_next_request() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200)
            .header("X-Trino-Set-Session", "k=v%201")
            .json_body(json!({
                "id": "q3",
                "stats": {},
                "infoUri": "/i",
                "nextUri": server.url("/v1/statement/q3/2"),
                "data": [],
            }));
    });
    let second = server.mock(|when, then| {
        when.method(httpmock::Method::GET)
            .path("/v1/statement/q3/2")
            .header("X-Trino-Session", "k=v%201");
        then.status(200).json_body(json!({
            "id": "q3",
            "stats": {},
            "infoUri": "/i",
            "data": [],
        }));
    });

    let request_layer = layer(&server);
    let mut query = Query::new(Arc::clone(&request_layer), "select 1");
    query.execute().unwrap();
    let _rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    let session = request_layer.session();
    let session = session.lock().unwrap();
    assert_eq!(session.properties.get("k"), Some(&"v 1".to_string()));
    drop(session);

    assert_eq!(first.hits(), 1);
    assert_eq!(second.hits(), 1);
}

#[test]
fn retries_503_then_succeeds_with_exactly_max_attempts() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(503);
    });

    let request_layer = layer(&server);
    let mut query = Query::new(Arc::clone(&request_layer), "select 1");
    let result = query.execute();

    assert!(result.is_err());
    assert_eq!(failing.hits(), 3);
}

#[test]
fn successful_page_needs_no_retry_overhead() {
    let server = MockServer::start();

    let post_mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q4",
            "stats": {},
            "infoUri": "/i",
            "data": [["ok"]],
        }));
    });

    let mut query = Query::new(layer(&server), "select 1");
    query.execute().unwrap();
    let rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(rows, vec![vec![json!("ok")]]);
    assert_eq!(post_mock.hits(), 1);
}

#[test]
fn installed_redirect_handler_walks_every_hop_manually() {
    let server = MockServer::start();
    let first_hop = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(307).header("Location", server.url("/v1/statement/hop2"));
    });
    let second_hop = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement/hop2");
        then.status(307).header("Location", server.url("/v1/statement/hop3"));
    });
    let final_hop = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement/hop3");
        then.status(200).json_body(json!({
            "id": "q9",
            "stats": {},
            "infoUri": "/i",
            "data": [[1]],
        }));
    });

    let request_layer = Arc::new(
        RequestLayerBuilder::new(server.host(), server.port(), "alice")
            .redirect_handler(Box::new(IdentityRedirectHandler))
            .max_attempts(3)
            .build()
            .expect("layer should build against a plain-HTTP mock server"),
    );
    let mut query = Query::new(request_layer, "select * from t");
    query.execute().unwrap();
    let rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(rows, vec![vec![json!(1)]]);
    assert_eq!(first_hop.hits(), 1);
    assert_eq!(second_hop.hits(), 1);
    assert_eq!(final_hop.hits(), 1);
}

#[test]
fn user_error_on_bad_sql() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q4",
            "stats": {},
            "infoUri": "/i",
            "error": {"errorType": "USER_ERROR", "message": "bad sql"},
        }));
    });

    let mut query = Query::new(layer(&server), "not valid sql");
    let result = query.execute();

    match result {
        Err(trino_client_core::Error::TrinoUser { query_id, message }) => {
            assert_eq!(query_id.as_deref(), Some("q4"));
            assert_eq!(message, "bad sql");
        }
        other => panic!("expected TrinoUser error, got {other:?}"),
    }
}

#[test]
fn error_response_does_not_mutate_session_even_with_set_session_header() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200)
            .header("X-Trino-Set-Session", "k=v")
            .json_body(json!({
                "id": "q10",
                "stats": {},
                "infoUri": "/i",
                "error": {"errorType": "USER_ERROR", "message": "bad sql"},
            }));
    });

    let request_layer = layer(&server);
    let mut query = Query::new(Arc::clone(&request_layer), "not valid sql");
    let result = query.execute();
    assert!(result.is_err());

    let session = request_layer.session();
    let session = session.lock().unwrap();
    assert!(session.properties.get("k").is_none());
}

#[test]
fn cancel_mid_stream_stops_iteration() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q5",
            "stats": {},
            "infoUri": "/i",
            "nextUri": server.url("/v1/statement/q5/2"),
            "data": [[1]],
        }));
    });
    let delete_mock = server.mock(|when, then| {
        when.method(httpmock::Method::DELETE).path("/v1/query/q5");
        then.status(204);
    });

    let mut query = Query::new(layer(&server), "select 1");
    query.execute().unwrap();
    query.cancel().unwrap();

    assert!(query.is_cancelled());
    assert_eq!(delete_mock.hits(), 1);

    let result = query.execute();
    assert!(matches!(result, Err(trino_client_core::Error::TrinoUser { .. })));
}

#[test]
fn extra_credential_validation_happens_before_any_http_call() {
    let server = MockServer::start();
    let never_hit = server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({"id": "q6", "stats": {}, "infoUri": "/i", "data": []}));
    });

    let mut session = trino_client_core::ClientSession::new("alice");
    session
        .extra_credential
        .insert("bad key".to_string(), "secret".to_string());

    let build_result = RequestLayerBuilder::new(server.host(), server.port(), "alice")
        .session(session)
        .build();

    // validate_custom_headers only checks reserved-header collisions at build time; the
    // extra-credential key is validated when headers are actually encoded, i.e. on the first
    // request attempt, before any bytes reach the wire.
    let request_layer = Arc::new(build_result.expect("build succeeds; header encoding is lazy"));
    let mut query = Query::new(request_layer, "select 1");
    let result = query.execute();

    assert!(matches!(
        result,
        Err(trino_client_core::Error::InvalidExtraCredentialKey { .. })
    ));
    assert_eq!(never_hit.hits(), 0);
}

#[test]
fn rows_are_not_duplicated_when_columns_drains_a_page_also_consumed_by_rows() {
    let server = MockServer::start();
    // First page: no data, no columns, just a nextUri — forces columns() to call fetch().
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q8",
            "stats": {},
            "infoUri": "/i",
            "nextUri": server.url("/v1/statement/q8/2"),
            "data": [],
        }));
    });
    // Second page: the one columns() drains into itself. Carries both columns and data.
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/v1/statement/q8/2");
        then.status(200).json_body(json!({
            "id": "q8",
            "stats": {},
            "infoUri": "/i",
            "data": [[1]],
            "columns": [{"name": "c", "type": "bigint", "typeSignature": {"rawType": "bigint", "arguments": []}}],
        }));
    });

    let mut query = Query::new(layer(&server), "select * from t");
    query.execute().unwrap();
    query.columns().unwrap();
    let rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(rows, vec![vec![json!(1)]]);
}

#[test]
fn columns_set_once_from_first_non_empty_page() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::POST).path("/v1/statement");
        then.status(200).json_body(json!({
            "id": "q7",
            "stats": {},
            "infoUri": "/i",
            "nextUri": server.url("/v1/statement/q7/2"),
            "data": [[1]],
            "columns": [{"name": "c", "type": "bigint", "typeSignature": {"rawType": "bigint", "arguments": []}}],
        }));
    });
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/v1/statement/q7/2");
        then.status(200).json_body(json!({
            "id": "q7",
            "stats": {},
            "infoUri": "/i",
            "data": [[2]],
            "columns": [{"name": "other", "type": "varchar", "typeSignature": {"rawType": "varchar", "arguments": []}}],
        }));
    });

    let mut query = Query::new(layer(&server), "select 1");
    query.execute().unwrap();
    let columns = query.columns().unwrap().unwrap().to_vec();
    let _rows: Vec<_> = query.rows().map(Result::unwrap).collect();

    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].name, "c");
}
