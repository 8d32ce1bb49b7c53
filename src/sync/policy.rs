//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了资源失效策略表：资源类型到失效键与清扫模式的映射。
//!
//! 资源类型是封闭枚举，每个类型对应一条静态规则，新增类型时编译器会
//! 提示所有需要补充的分支。

use crate::error::CacheError;
use crate::keys::{self, CacheKey, KeyKind, DEFAULT_PAGE_SIZE, FIRST_PAGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    Song,
    Album,
    Artist,
    Search,
    Autocomplete,
    TopSongs,
    Home,
    Favorite,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Song,
        ResourceKind::Album,
        ResourceKind::Artist,
        ResourceKind::Search,
        ResourceKind::Autocomplete,
        ResourceKind::TopSongs,
        ResourceKind::Home,
        ResourceKind::Favorite,
    ];

    /// 线上传输使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Song => "song",
            ResourceKind::Album => "album",
            ResourceKind::Artist => "artist",
            ResourceKind::Search => "search",
            ResourceKind::Autocomplete => "autocomplete",
            ResourceKind::TopSongs => "topSongs",
            ResourceKind::Home => "home",
            ResourceKind::Favorite => "favorite",
        }
    }

    /// 该类型对应的失效规则
    pub fn rule(&self) -> &'static dyn InvalidationRule {
        match self {
            ResourceKind::Song => &SongRule,
            ResourceKind::Album => &AlbumRule,
            ResourceKind::Artist => &ArtistRule,
            ResourceKind::Search => &SearchRule,
            ResourceKind::Autocomplete => &AutocompleteRule,
            ResourceKind::TopSongs => &TopSongsRule,
            ResourceKind::Home => &HomeRule,
            ResourceKind::Favorite => &FavoriteRule,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CacheError::UnsupportedResource(s.to_string()))
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

/// 单个资源类型的失效规则
pub trait InvalidationRule: Send + Sync {
    /// 无论查看者是谁都要删除的键
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey>;

    /// 每个查看者的首页列表键
    fn per_viewer_invalidate(&self, _id: Option<&str>, _viewers: &[String]) -> Vec<CacheKey> {
        Vec::new()
    }

    /// 需要按模式清扫的键
    fn sweep_pattern(&self, _id: Option<&str>) -> Option<String> {
        None
    }

    /// 订阅端在 update/delete 时额外点删的元数据键
    fn canonical_key(&self, _id: &str) -> Option<CacheKey> {
        None
    }

    /// 有新值时可以立即回填的热点键
    ///
    /// 只包含单个资源的点键，列表和聚合键留给读路径惰性重建
    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey>;
}

fn first_pages(kind: KeyKind, viewers: &[String]) -> Vec<CacheKey> {
    viewers
        .iter()
        .map(|viewer| {
            keys::build_key(
                kind,
                &keys::KeyParams::page(FIRST_PAGE, DEFAULT_PAGE_SIZE, Some(viewer)),
            )
        })
        .collect()
}

fn point_key(kind: KeyKind, id: Option<&str>) -> CacheKey {
    keys::build_key(
        kind,
        &keys::KeyParams {
            id,
            ..Default::default()
        },
    )
}

pub struct SongRule;

impl InvalidationRule for SongRule {
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::SongMeta, id), keys::top_songs()]
    }

    fn per_viewer_invalidate(&self, _id: Option<&str>, viewers: &[String]) -> Vec<CacheKey> {
        first_pages(KeyKind::SongList, viewers)
    }

    fn sweep_pattern(&self, _id: Option<&str>) -> Option<String> {
        keys::list_pattern(KeyKind::SongList, None)
    }

    fn canonical_key(&self, id: &str) -> Option<CacheKey> {
        Some(keys::song_meta(id))
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::SongMeta, id)]
    }
}

pub struct AlbumRule;

impl InvalidationRule for AlbumRule {
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::AlbumMeta, id)]
    }

    fn per_viewer_invalidate(&self, _id: Option<&str>, viewers: &[String]) -> Vec<CacheKey> {
        first_pages(KeyKind::AlbumList, viewers)
    }

    fn sweep_pattern(&self, _id: Option<&str>) -> Option<String> {
        keys::list_pattern(KeyKind::AlbumList, None)
    }

    fn canonical_key(&self, id: &str) -> Option<CacheKey> {
        Some(keys::album_meta(id))
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::AlbumMeta, id)]
    }
}

pub struct ArtistRule;

impl InvalidationRule for ArtistRule {
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::ArtistMeta, id)]
    }

    fn per_viewer_invalidate(&self, _id: Option<&str>, viewers: &[String]) -> Vec<CacheKey> {
        first_pages(KeyKind::ArtistList, viewers)
    }

    fn sweep_pattern(&self, _id: Option<&str>) -> Option<String> {
        keys::list_pattern(KeyKind::ArtistList, None)
    }

    fn canonical_key(&self, id: &str) -> Option<CacheKey> {
        Some(keys::artist_meta(id))
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::ArtistMeta, id)]
    }
}

pub struct SearchRule;

impl InvalidationRule for SearchRule {
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::SearchQuery, id)]
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        self.always_invalidate(id)
    }
}

pub struct AutocompleteRule;

impl InvalidationRule for AutocompleteRule {
    fn always_invalidate(&self, id: Option<&str>) -> Vec<CacheKey> {
        vec![point_key(KeyKind::AutocompleteQuery, id)]
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        self.always_invalidate(id)
    }
}

pub struct TopSongsRule;

impl InvalidationRule for TopSongsRule {
    fn always_invalidate(&self, _id: Option<&str>) -> Vec<CacheKey> {
        vec![keys::top_songs()]
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        self.always_invalidate(id)
    }
}

pub struct HomeRule;

impl InvalidationRule for HomeRule {
    fn always_invalidate(&self, _id: Option<&str>) -> Vec<CacheKey> {
        vec![keys::home()]
    }

    fn repopulate_keys(&self, id: Option<&str>) -> Vec<CacheKey> {
        self.always_invalidate(id)
    }
}

pub struct FavoriteRule;

impl InvalidationRule for FavoriteRule {
    fn always_invalidate(&self, _id: Option<&str>) -> Vec<CacheKey> {
        Vec::new()
    }

    fn per_viewer_invalidate(&self, _id: Option<&str>, viewers: &[String]) -> Vec<CacheKey> {
        first_pages(KeyKind::FavoriteList, viewers)
    }

    fn repopulate_keys(&self, _id: Option<&str>) -> Vec<CacheKey> {
        Vec::new()
    }
}

/// 一次资源变更需要执行的删除
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// 按规则顺序排列、已去重的键
    pub keys: Vec<CacheKey>,
    pub pattern: Option<String>,
}

/// 资源失效策略
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceInvalidationPolicy;

impl ResourceInvalidationPolicy {
    pub fn new() -> Self {
        Self
    }

    /// 计算变更对应的失效计划
    ///
    /// 显式传入的模式优先于规则自带的清扫模式
    pub fn plan(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        viewers: &[String],
        explicit_pattern: Option<&str>,
    ) -> InvalidationPlan {
        let rule = kind.rule();
        let mut keys: Vec<CacheKey> = Vec::new();
        for key in rule
            .always_invalidate(id)
            .into_iter()
            .chain(rule.per_viewer_invalidate(id, viewers))
        {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let pattern = explicit_pattern
            .map(str::to_string)
            .or_else(|| rule.sweep_pattern(id));

        InvalidationPlan { keys, pattern }
    }

    pub fn canonical_key(&self, kind: ResourceKind, id: &str) -> Option<CacheKey> {
        kind.rule().canonical_key(id)
    }

    pub fn repopulate_keys(&self, kind: ResourceKind, id: Option<&str>) -> Vec<CacheKey> {
        kind.rule().repopulate_keys(id)
    }
}
