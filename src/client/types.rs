//! 上游服务的请求/响应类型
//!
//! 线上传输编码对管道而言是不透明协作方，这里只定义经 serde
//! 映射的请求与响应结构，以及由响应派生、归调用方所有的记录类型。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::criteria::{CriteriaSet, TimeClass};

/// 搜索服务请求：复合条件、请求的属性、逻辑组合与上限
#[derive(Debug, Clone, Serialize)]
pub struct SearchUserPropertiesRequest {
    #[serde(flatten)]
    pub criteria: CriteriaSet,
    pub properties: Vec<String>,
    pub limit: u32,
}

impl SearchUserPropertiesRequest {
    pub fn new(criteria: CriteriaSet, properties: Vec<String>, limit: u32) -> Self {
        Self {
            criteria,
            properties,
            limit,
        }
    }
}

/// 单个属性值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyValue {
    #[serde(default)]
    pub value: String,
}

/// 一个用户的属性包
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPropertyBundle {
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchUserPropertiesResponse {
    #[serde(default)]
    pub user_properties: Vec<UserPropertyBundle>,
}

/// 采样得到的用户记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variant {
    #[serde(rename = "VARIANT_CHESS")]
    Chess,
    #[serde(rename = "VARIANT_CHESS960")]
    Chess960,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortField {
    #[serde(rename = "SORT_FIELD_GAME_END_TIME")]
    GameEndTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    #[serde(rename = "SORT_DIRECTION_ASC")]
    Asc,
    #[serde(rename = "SORT_DIRECTION_DESC")]
    Desc,
}

/// 归档服务的分页查询条件
///
/// 同一玩家的一次水合运行中，页号必须严格递增。
#[derive(Debug, Clone, Serialize)]
pub struct GameQuerySpec {
    pub player_id: String,
    pub time_classes: Vec<String>,
    pub ply_from: u32,
    pub rated: bool,
    pub variants: Vec<Variant>,
    pub sort_fields: Vec<SortField>,
    pub sort_direction: SortDirection,
    pub page: u32,
    pub page_size: u32,
}

impl GameQuerySpec {
    /// 最近有评分标准对局，按结束时间倒序
    pub fn recent_rated(player_id: &str, time_class: TimeClass, page: u32, page_size: u32) -> Self {
        Self {
            player_id: player_id.to_string(),
            time_classes: vec![time_class.wire_name().to_string()],
            ply_from: 2,
            rated: true,
            variants: vec![Variant::Chess],
            sort_fields: vec![SortField::GameEndTime],
            sort_direction: SortDirection::Desc,
            page,
            page_size,
        }
    }

    pub fn next_page(&self) -> Self {
        let mut spec = self.clone();
        spec.page += 1;
        spec
    }
}

/// 响应字段掩码，只拉取调用方需要的可选字段
#[derive(Debug, Clone, Serialize)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HydrateGamesRequest {
    pub criteria: GameQuerySpec,
    pub field_mask: FieldMask,
}

impl HydrateGamesRequest {
    pub fn new(criteria: GameQuerySpec, mask_paths: Vec<String>) -> Self {
        Self {
            criteria,
            field_mask: FieldMask { paths: mask_paths },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HydratedGame {
    #[serde(default)]
    pub game: serde_json::Value,
    #[serde(default)]
    pub eco_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HydrateGamesResponse {
    #[serde(default)]
    pub hydrated_games: Vec<HydratedGame>,
}

/// 对局记录：不透明的对局负载加按需请求的元数据，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eco_metadata: Option<serde_json::Value>,
}

impl GameRecord {
    /// 对局结束时间（毫秒时间戳），负载未携带时为 None
    pub fn end_time(&self) -> Option<i64> {
        self.game.get("end_time").and_then(serde_json::Value::as_i64)
    }
}

impl From<HydratedGame> for GameRecord {
    fn from(hydrated: HydratedGame) -> Self {
        Self {
            game: hydrated.game,
            eco_metadata: hydrated.eco_metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_rated_spec_defaults() {
        let spec = GameQuerySpec::recent_rated("p1", TimeClass::Blitz, 1, 100);
        assert_eq!(spec.time_classes, vec!["TIME_CLASS_BLITZ".to_string()]);
        assert_eq!(spec.ply_from, 2);
        assert!(spec.rated);
        assert_eq!(spec.sort_direction, SortDirection::Desc);
        assert_eq!(spec.page, 1);
    }

    #[test]
    fn test_next_page_increments() {
        let spec = GameQuerySpec::recent_rated("p1", TimeClass::Blitz, 1, 100);
        let next = spec.next_page();
        assert_eq!(next.page, 2);
        assert_eq!(next.player_id, spec.player_id);
    }

    #[test]
    fn test_game_record_end_time() {
        let record = GameRecord {
            game: serde_json::json!({"end_time": 1700000000123i64, "pgn": "1. e4"}),
            eco_metadata: None,
        };
        assert_eq!(record.end_time(), Some(1700000000123));

        let opaque = GameRecord {
            game: serde_json::json!({"pgn": "1. d4"}),
            eco_metadata: None,
        };
        assert_eq!(opaque.end_time(), None);
    }

    #[test]
    fn test_wire_enum_names() {
        let spec = GameQuerySpec::recent_rated("p1", TimeClass::Blitz, 1, 50);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["variants"][0], "VARIANT_CHESS");
        assert_eq!(json["sort_fields"][0], "SORT_FIELD_GAME_END_TIME");
        assert_eq!(json["sort_direction"], "SORT_DIRECTION_DESC");
    }
}
