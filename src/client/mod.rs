//! 上游服务客户端
//!
//! 两个上游服务通过带 API Key 的 RPC 访问：搜索型的用户属性服务与
//! 分页拉取的对局归档服务。组件只依赖 trait 接口，HTTP 实现、
//! 端点与凭证在构造时显式注入，测试中以桩实现替换。

use async_trait::async_trait;

use crate::error::UpstreamFault;

mod http;
mod types;

pub use http::{GameArchiveClient, UserPropertiesClient};
pub use types::{
    FieldMask, GameQuerySpec, GameRecord, HydrateGamesRequest, HydrateGamesResponse, HydratedGame,
    PropertyValue, SearchUserPropertiesRequest, SearchUserPropertiesResponse, SortDirection,
    SortField, UserPropertyBundle, UserRecord, Variant,
};

/// 用户属性搜索服务
#[async_trait]
pub trait UserPropertiesApi: Send + Sync {
    async fn search_user_properties(
        &self,
        request: &SearchUserPropertiesRequest,
    ) -> Result<SearchUserPropertiesResponse, UpstreamFault>;
}

/// 对局归档服务
#[async_trait]
pub trait GameArchiveApi: Send + Sync {
    async fn hydrate_games(
        &self,
        request: &HydrateGamesRequest,
    ) -> Result<HydrateGamesResponse, UpstreamFault>;
}
