use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token intermediary answering the authorization-code grant once with
/// `access_token` (and an optional refresh token).
#[allow(dead_code)]
pub async fn mount_code_exchange(server: &MockServer, access_token: &str, refresh_token: Option<&str>) {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = serde_json::Value::from(rt);
    }
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

/// Token intermediary answering the refresh grant for `refresh_token`.
#[allow(dead_code)]
pub async fn mount_refresh(server: &MockServer, refresh_token: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={refresh_token}")))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

/// Query engine answering requests made with `bearer`.
#[allow(dead_code)]
pub async fn mount_query(server: &MockServer, bearer: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn rows_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "columns": ["region", "total"],
        "rows": [["emea", 42], ["apac", 7]],
        "rowCount": 2,
    }))
}
