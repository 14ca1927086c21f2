use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::session::error::BrokerError;
use crate::session::types::{FunctionExecutionContext, UpstreamCall};
use crate::settings::ErrorResponses;

pub const FUNCTION_PATH: &str = "/api/GetMultiplayerServer";

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn invoke(&self, context: FunctionExecutionContext) -> Result<Value, BrokerError>;
}

#[derive(Default)]
struct NoOpHandler {}

#[async_trait]
impl FunctionHandler for NoOpHandler {
    async fn invoke(&self, context: FunctionExecutionContext) -> Result<Value, BrokerError> {
        log::info!("Processing {:?}", context);
        Err(BrokerError::ArgumentsMissing)
    }
}

/// HTTP front of the `GetMultiplayerServer` function.
pub struct FunctionServer {
    error_responses: ErrorResponses,
    handler: Arc<dyn FunctionHandler + Send + Sync>,
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    call: Option<UpstreamCall>,
    message: String,
}

impl Default for FunctionServer {
    fn default() -> Self {
        FunctionServer {
            error_responses: ErrorResponses::Silent,
            handler: Arc::new(NoOpHandler::default()),
        }
    }
}

impl FunctionServer {
    pub fn new(
        error_responses: ErrorResponses,
        handler: Arc<dyn FunctionHandler + Send + Sync>,
    ) -> FunctionServer {
        FunctionServer {
            error_responses,
            handler,
        }
    }

    pub async fn start(&'static self, port: u16) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        log::info!("Server is listening on {}", port);
        Server::try_bind(&addr)?
            .serve(make_service_fn(|_conn| async move {
                Ok::<_, Infallible>(service_fn(move |r| self.router(r)))
            }))
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutting down");
                }
            })
            .await?;
        anyhow::Ok(())
    }

    async fn router(&self, request: Request<Body>) -> Result<Response<Body>, Infallible> {
        log::info!("{} {}", request.method(), request.uri());
        let response = match (request.method().clone(), request.uri().path()) {
            (Method::GET, FUNCTION_PATH) | (Method::POST, FUNCTION_PATH) => {
                self.handle_invocation(request).await
            }
            _ => empty_response(StatusCode::NOT_FOUND),
        };
        Ok(response)
    }

    async fn handle_invocation(&self, request: Request<Body>) -> Response<Body> {
        let context = match parse_context(request.into_body()).await {
            Ok(context) => context,
            Err(err) => {
                log::debug!("Rejecting invocation: {}", err);
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &ErrorBody {
                        error: "InvalidRequest",
                        call: None,
                        message: err.to_string(),
                    },
                );
            }
        };
        let result = self.handler.invoke(context).await;
        self.render(result)
    }

    fn render(&self, result: Result<Value, BrokerError>) -> Response<Body> {
        let err = match result {
            Ok(value) => return json_response(StatusCode::OK, &value),
            Err(err) => err,
        };
        let status = match &err {
            BrokerError::ArgumentsMissing => {
                log::debug!("Ignoring invocation without arguments");
                return json_response(StatusCode::OK, &Value::Null);
            }
            BrokerError::UpstreamFailure {
                call: UpstreamCall::GetEntityToken,
                ..
            } => StatusCode::BAD_GATEWAY,
            BrokerError::UpstreamFailure { .. } => match self.error_responses {
                ErrorResponses::Silent => return json_response(StatusCode::OK, &Value::Null),
                ErrorResponses::Explicit => StatusCode::BAD_GATEWAY,
            },
            BrokerError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let call = match &err {
            BrokerError::UpstreamFailure { call, .. } => Some(*call),
            _ => None,
        };
        json_response(
            status,
            &ErrorBody {
                error: err.kind(),
                call,
                message: err.to_string(),
            },
        )
    }
}

/// An empty body (e.g. a bare GET) is an invocation without arguments.
async fn parse_context(body: Body) -> anyhow::Result<FunctionExecutionContext> {
    let buf = hyper::body::to_bytes(body).await?;
    if buf.iter().all(|b| b.is_ascii_whitespace()) {
        return anyhow::Ok(FunctionExecutionContext::default());
    }
    let context: Option<FunctionExecutionContext> = serde_json::from_slice(buf.as_ref())?;
    anyhow::Ok(context.unwrap_or_default())
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Body> {
    let json = serde_json::to_vec(payload).unwrap_or_else(|_| b"null".to_vec());
    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
