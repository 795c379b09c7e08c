//! 采样条件构建
//!
//! 将评分桶参数与固定的质量过滤条件组合为上游搜索服务可理解的
//! 复合过滤表达式。构建过程是纯函数：相同的桶参数与过滤配置
//! 必然产出结构完全一致的条件集。

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 上游目标服务支持的二元操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinaryOperator {
    Greater,
    Lesser,
    Equals,
    /// 距今时间窗口（毫秒）
    Within,
    /// 值属于给定集合（逗号分隔）
    AnyOf,
}

/// 条件集的组合逻辑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// 单个过滤条件，构建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub user_property: String,
    pub binary_operator: BinaryOperator,
    pub value: String,
}

impl Criterion {
    pub fn new(
        property: impl Into<String>,
        operator: BinaryOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            user_property: property.into(),
            binary_operator: operator,
            value: value.into(),
        }
    }
}

/// 有序条件序列加组合逻辑
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaSet {
    pub criteria: Vec<Criterion>,
    pub logical_operator: LogicalOperator,
}

impl CriteriaSet {
    pub fn new(criteria: Vec<Criterion>, logical_operator: LogicalOperator) -> Result<Self> {
        if criteria.is_empty() {
            return Err(PipelineError::Validation(
                "criteria set must not be empty".to_string(),
            ));
        }
        Ok(Self {
            criteria,
            logical_operator,
        })
    }
}

/// 被采样的时间控制类别，评分相关属性名由此派生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeClass {
    Bullet,
    Blitz,
    Rapid,
    Daily,
}

impl TimeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeClass::Bullet => "bullet",
            TimeClass::Blitz => "blitz",
            TimeClass::Rapid => "rapid",
            TimeClass::Daily => "daily",
        }
    }

    /// 归档服务的枚举名
    pub fn wire_name(&self) -> &'static str {
        match self {
            TimeClass::Bullet => "TIME_CLASS_BULLET",
            TimeClass::Blitz => "TIME_CLASS_BLITZ",
            TimeClass::Rapid => "TIME_CLASS_RAPID",
            TimeClass::Daily => "TIME_CLASS_DAILY",
        }
    }

    pub fn rating_property(&self) -> String {
        format!("rating_chess_{}", self.as_str())
    }

    pub fn opponent_rating_property(&self) -> String {
        format!("game_stats_live_{}_avg_opponent_rating", self.as_str())
    }

    pub fn rated_game_count_property(&self) -> String {
        format!("game_stats_live_{}_total_rated_game_count", self.as_str())
    }
}

/// 评分桶：用于分层采样的连续评分区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleBucket {
    pub rating_min: u32,
    pub rating_max: u32,
    pub player_per_bucket: u32,
}

impl SampleBucket {
    pub fn new(rating_min: u32, rating_max: u32, player_per_bucket: u32) -> Self {
        Self {
            rating_min,
            rating_max,
            player_per_bucket,
        }
    }

    /// 采样前必须通过的不变量检查
    pub fn validate(&self) -> Result<()> {
        if self.rating_min >= self.rating_max {
            return Err(PipelineError::Validation(format!(
                "rating_min ({}) must be less than rating_max ({})",
                self.rating_min, self.rating_max
            )));
        }
        if self.player_per_bucket == 0 {
            return Err(PipelineError::Validation(
                "player_per_bucket must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// 质量过滤参数
///
/// 默认值：至少 200 局有评分对局、30 天内活跃、付费等级白名单
/// （排除已封禁/标记账号）、对手强度带比桶边界各收窄 30 分。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QualityFilters {
    #[serde(default = "default_min_rated_games")]
    pub min_rated_games: u32,
    #[serde(default = "default_recency_window_ms")]
    pub recency_window_ms: u64,
    #[serde(default = "default_membership_allow_list")]
    pub membership_allow_list: Vec<u32>,
    #[serde(default = "default_opponent_rating_offset")]
    pub opponent_rating_offset: u32,
}

fn default_min_rated_games() -> u32 {
    200
}

fn default_recency_window_ms() -> u64 {
    // 30 天
    2_592_000_000
}

fn default_membership_allow_list() -> Vec<u32> {
    vec![10, 30, 40, 50]
}

fn default_opponent_rating_offset() -> u32 {
    30
}

impl Default for QualityFilters {
    fn default() -> Self {
        Self {
            min_rated_games: default_min_rated_games(),
            recency_window_ms: default_recency_window_ms(),
            membership_allow_list: default_membership_allow_list(),
            opponent_rating_offset: default_opponent_rating_offset(),
        }
    }
}

/// 条件构建器
///
/// 评分窗口作用在被采样的评分维度上，与质量过滤条件以 AND 组合。
/// 对手强度带由桶边界加偏移推导，不使用任何写死的评分区间。
#[derive(Debug, Clone)]
pub struct CriteriaBuilder {
    time_class: TimeClass,
    filters: QualityFilters,
}

impl CriteriaBuilder {
    pub fn new(time_class: TimeClass, filters: QualityFilters) -> Self {
        Self {
            time_class,
            filters,
        }
    }

    pub fn build(&self, bucket: &SampleBucket) -> CriteriaSet {
        let tc = self.time_class;
        let band_low = bucket.rating_min.saturating_add(self.filters.opponent_rating_offset);
        let band_high = bucket.rating_max.saturating_sub(self.filters.opponent_rating_offset);
        let memberships = self
            .filters
            .membership_allow_list
            .iter()
            .map(|level| level.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let criteria = vec![
            Criterion::new(
                tc.opponent_rating_property(),
                BinaryOperator::Greater,
                band_low.to_string(),
            ),
            Criterion::new(
                tc.opponent_rating_property(),
                BinaryOperator::Lesser,
                band_high.to_string(),
            ),
            Criterion::new(
                tc.rating_property(),
                BinaryOperator::Greater,
                bucket.rating_min.to_string(),
            ),
            Criterion::new(
                tc.rating_property(),
                BinaryOperator::Lesser,
                bucket.rating_max.to_string(),
            ),
            Criterion::new(
                tc.rated_game_count_property(),
                BinaryOperator::Greater,
                self.filters.min_rated_games.to_string(),
            ),
            Criterion::new(
                "last_game_played",
                BinaryOperator::Within,
                self.filters.recency_window_ms.to_string(),
            ),
            Criterion::new("membership_level", BinaryOperator::AnyOf, memberships),
        ];

        CriteriaSet {
            criteria,
            logical_operator: LogicalOperator::And,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CriteriaBuilder {
        CriteriaBuilder::new(TimeClass::Blitz, QualityFilters::default())
    }

    #[test]
    fn test_build_is_deterministic() {
        let bucket = SampleBucket::new(2900, 3000, 200);
        let first = builder().build(&bucket);
        let second = builder().build(&bucket);
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_combines_with_and() {
        let bucket = SampleBucket::new(1000, 2000, 200);
        let set = builder().build(&bucket);
        assert_eq!(set.logical_operator, LogicalOperator::And);
        assert_eq!(set.criteria.len(), 7);
    }

    #[test]
    fn test_rating_window_uses_bucket_bounds() {
        let bucket = SampleBucket::new(1000, 2000, 200);
        let set = builder().build(&bucket);
        let window: Vec<&Criterion> = set
            .criteria
            .iter()
            .filter(|c| c.user_property == "rating_chess_blitz")
            .collect();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].binary_operator, BinaryOperator::Greater);
        assert_eq!(window[0].value, "1000");
        assert_eq!(window[1].binary_operator, BinaryOperator::Lesser);
        assert_eq!(window[1].value, "2000");
    }

    #[test]
    fn test_opponent_band_derived_from_bucket_and_offset() {
        let bucket = SampleBucket::new(2900, 3000, 200);
        let set = builder().build(&bucket);
        let band: Vec<&Criterion> = set
            .criteria
            .iter()
            .filter(|c| c.user_property == "game_stats_live_blitz_avg_opponent_rating")
            .collect();
        assert_eq!(band[0].value, "2930");
        assert_eq!(band[1].value, "2970");
    }

    #[test]
    fn test_quality_filters_present() {
        let bucket = SampleBucket::new(1000, 2000, 200);
        let set = builder().build(&bucket);
        let props: Vec<&str> = set
            .criteria
            .iter()
            .map(|c| c.user_property.as_str())
            .collect();
        assert!(props.contains(&"game_stats_live_blitz_total_rated_game_count"));
        assert!(props.contains(&"last_game_played"));
        assert!(props.contains(&"membership_level"));
        let membership = set
            .criteria
            .iter()
            .find(|c| c.user_property == "membership_level")
            .unwrap();
        assert_eq!(membership.binary_operator, BinaryOperator::AnyOf);
        assert_eq!(membership.value, "10,30,40,50");
    }

    #[test]
    fn test_bucket_validation() {
        assert!(SampleBucket::new(1000, 2000, 200).validate().is_ok());
        assert!(SampleBucket::new(2000, 2000, 200).validate().is_err());
        assert!(SampleBucket::new(2100, 2000, 200).validate().is_err());
        assert!(SampleBucket::new(1000, 2000, 0).validate().is_err());
    }

    #[test]
    fn test_empty_criteria_set_rejected() {
        assert!(CriteriaSet::new(Vec::new(), LogicalOperator::And).is_err());
    }

    #[test]
    fn test_time_class_property_names() {
        assert_eq!(TimeClass::Rapid.rating_property(), "rating_chess_rapid");
        assert_eq!(
            TimeClass::Bullet.opponent_rating_property(),
            "game_stats_live_bullet_avg_opponent_rating"
        );
        assert_eq!(TimeClass::Blitz.wire_name(), "TIME_CLASS_BLITZ");
    }
}
