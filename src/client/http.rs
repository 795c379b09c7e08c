//! 基于 reqwest 的 JSON-over-HTTP 客户端实现

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{FaultKind, PipelineError, Result, UpstreamFault};
use crate::policy::classify;

use super::types::{
    HydrateGamesRequest, HydrateGamesResponse, SearchUserPropertiesRequest,
    SearchUserPropertiesResponse,
};
use super::{GameArchiveApi, UserPropertiesApi};

const API_KEY_HEADER: &str = "X-Api-Key";

const SEARCH_PATH: &str =
    "/service/user-properties/user_properties.v1.UserPropertiesService/SearchUserProperties";
const HYDRATE_PATH: &str =
    "/service/player-game-archive/game_gateway.v1.GameGatewayService/HydrateGamesByCriteria";

/// 上游错误响应体
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    meta: HashMap<String, String>,
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()
        .map_err(|err| PipelineError::Config(format!("failed to build http client: {}", err)))
}

fn transport_fault(err: reqwest::Error) -> UpstreamFault {
    let (kind, code) = if err.is_timeout() {
        (FaultKind::Transient, "deadline_exceeded")
    } else if err.is_connect() {
        (FaultKind::Transient, "unavailable")
    } else {
        (FaultKind::Unknown, "transport_error")
    };
    UpstreamFault::new(kind, code, err.to_string())
}

fn decode_fault(err: reqwest::Error) -> UpstreamFault {
    UpstreamFault::new(FaultKind::Unknown, "malformed_response", err.to_string())
}

async fn fault_from_response(response: reqwest::Response) -> UpstreamFault {
    let status = response.status().as_u16();
    match response.json::<ErrorBody>().await {
        Ok(body) if !body.code.is_empty() => UpstreamFault {
            kind: classify(&body.code, Some(status)),
            code: body.code,
            message: body.msg,
            meta: body.meta,
        },
        _ => UpstreamFault::new(
            classify("", Some(status)),
            format!("http_{}", status),
            "upstream returned a non-success status",
        ),
    }
    .with_meta("http_status", status.to_string())
}

/// 用户属性服务客户端
///
/// 端点与 API Key 在构造时注入，不存在模块级单例。
#[derive(Clone)]
pub struct UserPropertiesClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl UserPropertiesClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl UserPropertiesApi for UserPropertiesClient {
    async fn search_user_properties(
        &self,
        request: &SearchUserPropertiesRequest,
    ) -> std::result::Result<SearchUserPropertiesResponse, UpstreamFault> {
        let url = format!("{}{}", self.endpoint, SEARCH_PATH);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_fault)?;

        if !response.status().is_success() {
            return Err(fault_from_response(response).await);
        }
        response
            .json::<SearchUserPropertiesResponse>()
            .await
            .map_err(decode_fault)
    }
}

/// 对局归档服务客户端
#[derive(Clone)]
pub struct GameArchiveClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GameArchiveClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl GameArchiveApi for GameArchiveClient {
    async fn hydrate_games(
        &self,
        request: &HydrateGamesRequest,
    ) -> std::result::Result<HydrateGamesResponse, UpstreamFault> {
        let url = format!("{}{}", self.endpoint, HYDRATE_PATH);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_fault)?;

        if !response.status().is_success() {
            return Err(fault_from_response(response).await);
        }
        response
            .json::<HydrateGamesResponse>()
            .await
            .map_err(decode_fault)
    }
}
