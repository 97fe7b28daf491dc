//! `<http>` with its nested `<http-header>` and `<http-param>`.

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

/// Headers and parameters collected from an `<http>` body.
#[derive(Debug, Default)]
pub struct HttpRequest {
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
}

/// Charset named in a `Content-Type` header, if any.
fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Whether a body of this content type should be decoded as text.
fn is_textual(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime.is_empty()
        || mime.starts_with("text/")
        || ["json", "xml", "javascript", "html", "x-www-form-urlencoded"]
            .iter()
            .any(|t| mime.contains(t))
}

/// `<http>`: performs a GET or POST and yields the response body.
pub struct HttpOp;

impl HttpOp {
    const INFO: ElementInfo = ElementInfo {
        name: "http",
        valid_attributes: &["method", "charset"],
        required_attributes: &["url"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for HttpOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        match attribute {
            "method" => Some(vec!["get".into(), "post".into()]),
            other => crate::definition::common_suggestions(other),
        }
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let url = ctx.required_attribute(node, "url")?;
        let method = match ctx
            .evaluate_attribute(node, "method")?
            .map(|m| m.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("get") => Method::GET,
            Some("post") => Method::POST,
            Some(other) => {
                return Err(HarvestError::domain(format!(
                    "unsupported http method '{other}'"
                )));
            }
        };
        let charset = ctx
            .evaluate_attribute(node, "charset")?
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| ctx.config().charset.clone());

        ctx.provide(HttpRequest::default());
        let body = ctx.execute_body(node).await?;
        let request = ctx.withdraw::<HttpRequest>().unwrap_or_default();

        let mut builder = ctx.http_client().request(method.clone(), url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = if method == Method::GET {
            builder.query(&request.params)
        } else if !request.params.is_empty() {
            builder.form(&request.params)
        } else {
            builder.body(body.to_binary(&charset))
        };

        debug!(%method, %url, "sending request");
        let cancel = ctx.cancel_token();
        let response = tokio::select! {
            r = builder.send() => r.map_err(|e| HarvestError::Network(format!("{url}: {e}")))?,
            _ = cancel.cancelled() => return Err(HarvestError::Interrupted),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{url}: HTTP {status}")));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = tokio::select! {
            b = response.bytes() => b.map_err(|e| HarvestError::Network(format!("{url}: body read failed: {e}")))?,
            _ = cancel.cancelled() => return Err(HarvestError::Interrupted),
        };

        ctx.define("http.status", Value::Text(status.as_u16().to_string()));
        ctx.define("http.content-type", Value::Text(content_type.clone()));

        if is_textual(&content_type) {
            let charset = charset_of(&content_type).unwrap_or(charset.as_str());
            Ok(Value::decode(&bytes, charset))
        } else {
            Ok(Value::Binary(bytes.to_vec()))
        }
    }
}

/// `<http-header>`: adds a header to the enclosing request.
pub struct HttpHeaderOp;

impl HttpHeaderOp {
    const INFO: ElementInfo = ElementInfo {
        name: "http-header",
        valid_attributes: &[],
        required_attributes: &["name"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for HttpHeaderOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.require_enclosing::<HttpRequest>("http-header", "http")?;
        let name = ctx.required_attribute(node, "name")?;
        let value = ctx.execute_body(node).await?.to_text();
        ctx.require_enclosing::<HttpRequest>("http-header", "http")?
            .headers
            .push((name, value));
        Ok(Value::Empty)
    }
}

/// `<http-param>`: adds a query or form parameter to the enclosing request.
pub struct HttpParamOp;

impl HttpParamOp {
    const INFO: ElementInfo = ElementInfo {
        name: "http-param",
        valid_attributes: &[],
        required_attributes: &["name"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for HttpParamOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.require_enclosing::<HttpRequest>("http-param", "http")?;
        let name = ctx.required_attribute(node, "name")?;
        let value = ctx.execute_body(node).await?.to_text();
        ctx.require_enclosing::<HttpRequest>("http-param", "http")?
            .params
            .push((name, value));
        Ok(Value::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run;
    use harvest_shared::ErrorKind;

    #[test]
    fn content_type_charset_is_extracted() {
        assert_eq!(
            charset_of("text/html; charset=\"ISO-8859-1\""),
            Some("ISO-8859-1")
        );
        assert_eq!(charset_of("text/html"), None);
        assert!(is_textual("application/json"));
        assert!(!is_textual("image/png"));
    }

    #[tokio::test]
    async fn get_sends_headers_and_query_params() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/search"))
            .and(wiremock::matchers::query_param("q", "rust"))
            .and(wiremock::matchers::header("x-token", "abc"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain; charset=utf-8")
                    .set_body_string("found"),
            )
            .mount(&server)
            .await;

        let doc = format!(
            r#"<http url="{}/search">
                <http-header name="x-token">abc</http-header>
                <http-param name="q">rust</http-param>
            </http>"#,
            server.uri()
        );
        assert_eq!(run(&doc).await.unwrap(), Value::from("found"));
    }

    #[tokio::test]
    async fn post_sends_form_params() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::body_string("user=ann"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let doc = format!(
            r#"<http url="{}/login" method="post"><http-param name="user">ann</http-param></http>"#,
            server.uri()
        );
        assert_eq!(run(&doc).await.unwrap(), Value::from("ok"));
    }

    #[tokio::test]
    async fn binary_responses_stay_binary() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(vec![0u8, 159, 146, 150], "application/octet-stream"),
            )
            .mount(&server)
            .await;

        let value = run(&format!(r#"<http url="{}/blob"/>"#, server.uri()))
            .await
            .unwrap();
        assert_eq!(value, Value::Binary(vec![0, 159, 146, 150]));
    }

    #[tokio::test]
    async fn error_status_is_a_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = run(&format!(r#"<http url="{}/"/>"#, server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn header_outside_http_is_a_domain_error() {
        let err = run(r#"<http-header name="a">b</http-header>"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert!(err.to_string().contains("cannot use http-header outside of http"));
    }
}
