use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::filter::FilterSet;

/// One data row: column name to scalar value. May carry the internal
/// row-identity field, which downstream code strips before export.
pub type RowRecord = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub columns: Vec<ColumnSpec>,
    pub total_rows: usize,
}

#[derive(Debug, Serialize)]
pub struct RowsRequest<'a> {
    pub path: &'a str,
    pub offset: usize,
    pub limit: usize,
    pub filters: &'a FilterSet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    pub data: Vec<RowRecord>,
    pub has_more: bool,
    pub total_rows: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("backend unreachable: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response. The message is the server-supplied one when the
    /// body carried it.
    #[error("{message}")]
    Response { status: u16, message: String },
    #[error("backend returned an empty or non-JSON body")]
    MissingPayload,
    #[error("malformed backend payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Request/response seam to the backend that reads and filters the actual
/// files. The viewer only ever sees metadata and row pages.
pub trait DataGateway {
    fn metadata(&self, path: &str) -> Result<FileMetadata, GatewayError>;
    fn rows(&self, request: &RowsRequest<'_>) -> Result<RowPage, GatewayError>;
}

pub struct HttpGateway {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("tdv/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    fn post(&self, endpoint: &str, body: &impl Serialize) -> Result<Value, GatewayError> {
        let url = self.url_for(endpoint);
        trace!("POST {url}");
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        let text = response.text()?;

        // An empty or non-JSON body is tolerated; it just carries no payload.
        let payload: Option<Value> = if text.is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(_) => {
                    debug!("Not a JSON response body from {url}");
                    None
                }
            }
        };

        if !status.is_success() {
            // A server-supplied message wins over generic transport text.
            let message = payload
                .as_ref()
                .and_then(|v| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if text.is_empty() {
                        format!("request failed with status {status}")
                    } else {
                        text.clone()
                    }
                });
            return Err(GatewayError::Response {
                status: status.as_u16(),
                message,
            });
        }

        payload.ok_or(GatewayError::MissingPayload)
    }
}

impl DataGateway for HttpGateway {
    fn metadata(&self, path: &str) -> Result<FileMetadata, GatewayError> {
        let value = self.post("metadata", &serde_json::json!({ "path": path }))?;
        Ok(serde_json::from_value(value)?)
    }

    fn rows(&self, request: &RowsRequest<'_>) -> Result<RowPage, GatewayError> {
        let value = self.post("data", request)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::filter::Filter;

    /// One-shot server answering every request with a canned response.
    fn spawn_server(status: u16, body: &'static str) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", server.server_addr().to_ip().unwrap());
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });
        addr
    }

    /// Server that reports each request body on a channel before replying.
    fn spawn_capture_server(reply: &'static str) -> (String, mpsc::Receiver<String>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", server.server_addr().to_ip().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut content = String::new();
                let _ = request.as_reader().read_to_string(&mut content);
                let _ = tx.send(content);
                let _ = request.respond(tiny_http::Response::from_string(reply));
            }
        });
        (addr, rx)
    }

    #[test]
    fn url_joining_tolerates_trailing_slash() {
        let gateway = HttpGateway::new("http://localhost:8888/api").unwrap();
        assert_eq!(gateway.url_for("data"), "http://localhost:8888/api/data");
        let gateway = HttpGateway::new("http://localhost:8888/api/").unwrap();
        assert_eq!(gateway.url_for("data"), "http://localhost:8888/api/data");
    }

    #[test]
    fn parses_metadata_response() {
        let addr = spawn_server(
            200,
            r#"{"columns":[{"name":"id","type":"int64"},{"name":"name","type":"string"}],"totalRows":1000}"#,
        );
        let gateway = HttpGateway::new(addr).unwrap();
        let meta = gateway.metadata("trips.parquet").unwrap();
        assert_eq!(meta.total_rows, 1000);
        assert_eq!(meta.columns.len(), 2);
        assert_eq!(meta.columns[0].name, "id");
        assert_eq!(meta.columns[0].type_tag, "int64");
    }

    #[test]
    fn server_message_takes_precedence() {
        let addr = spawn_server(500, r#"{"message":"disk read error"}"#);
        let gateway = HttpGateway::new(addr).unwrap();
        match gateway.metadata("trips.parquet").unwrap_err() {
            GatewayError::Response { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "disk read error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_is_tolerated() {
        let addr = spawn_server(502, "upstream exploded");
        let gateway = HttpGateway::new(addr).unwrap();
        match gateway.metadata("trips.parquet").unwrap_err() {
            GatewayError::Response { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_error_body_falls_back_to_status_text() {
        let addr = spawn_server(500, "");
        let gateway = HttpGateway::new(addr).unwrap();
        match gateway.metadata("trips.parquet").unwrap_err() {
            GatewayError::Response { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("500"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_success_body_is_missing_payload_not_a_panic() {
        let addr = spawn_server(200, "");
        let gateway = HttpGateway::new(addr).unwrap();
        assert!(matches!(
            gateway.metadata("trips.parquet").unwrap_err(),
            GatewayError::MissingPayload
        ));
    }

    #[test]
    fn rows_request_carries_offset_limit_and_filters() {
        let (addr, rx) =
            spawn_capture_server(r#"{"data":[],"hasMore":false,"totalRows":0}"#);
        let gateway = HttpGateway::new(addr).unwrap();
        let mut filters = FilterSet::new();
        filters.insert(
            "score".into(),
            Filter::Number {
                operator: ">=".into(),
                value: "90".into(),
            },
        );
        let page = gateway
            .rows(&RowsRequest {
                path: "trips.parquet",
                offset: 500,
                limit: 500,
                filters: &filters,
            })
            .unwrap();
        assert!(!page.has_more);

        let body: Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(body["path"], "trips.parquet");
        assert_eq!(body["offset"], 500);
        assert_eq!(body["limit"], 500);
        assert_eq!(
            body["filters"]["score"],
            serde_json::json!({"kind": "number", "operator": ">=", "value": "90"})
        );
    }

    #[test]
    fn parses_row_page() {
        let addr = spawn_server(
            200,
            r#"{"data":[{"id":1,"name":"a"},{"id":2,"name":null}],"hasMore":true,"totalRows":42}"#,
        );
        let gateway = HttpGateway::new(addr).unwrap();
        let page = gateway
            .rows(&RowsRequest {
                path: "x.csv",
                offset: 0,
                limit: 2,
                filters: &FilterSet::new(),
            })
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total_rows, 42);
        assert_eq!(page.data[0]["id"], 1);
        assert!(page.data[1]["name"].is_null());
    }
}
