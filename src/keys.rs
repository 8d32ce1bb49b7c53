//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键空间：资源类型与参数到缓存键的纯函数映射。
//!
//! 每种键都有固定的命名空间前缀，参数按固定顺序拼接；自由文本参数中的
//! `%` 与 `:` 会被转义，因此不同参数永远不会生成相同的键。

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 未登录用户的查看者标识
pub const GUEST: &str = "guest";

/// 缺失资源ID时使用的占位符
pub const MISSING_ID: &str = "_";

/// 列表默认页码
pub const FIRST_PAGE: u32 = 1;

/// 列表默认分页大小
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// 缓存键
///
/// 不透明的字符串，只能通过本模块的构造函数生成
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// 直接包装一个已知的键字符串（例如从 SCAN 结果或失效消息中读取）
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// 缓存键类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    SongMeta,
    SongRecommend,
    SongWaveform,
    TopSongs,
    SongList,
    ArtistMeta,
    ArtistList,
    AlbumMeta,
    AlbumList,
    FavoriteList,
    ProfileMeta,
    MyProfileMeta,
    SearchQuery,
    AutocompleteQuery,
    HomeFeed,
    UserHistory,
}

impl KeyKind {
    /// 所有键类型，按声明顺序
    pub const ALL: [KeyKind; 16] = [
        KeyKind::SongMeta,
        KeyKind::SongRecommend,
        KeyKind::SongWaveform,
        KeyKind::TopSongs,
        KeyKind::SongList,
        KeyKind::ArtistMeta,
        KeyKind::ArtistList,
        KeyKind::AlbumMeta,
        KeyKind::AlbumList,
        KeyKind::FavoriteList,
        KeyKind::ProfileMeta,
        KeyKind::MyProfileMeta,
        KeyKind::SearchQuery,
        KeyKind::AutocompleteQuery,
        KeyKind::HomeFeed,
        KeyKind::UserHistory,
    ];

    /// 键的命名空间前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyKind::SongMeta => "song:meta:",
            KeyKind::SongRecommend => "song:recommend:",
            KeyKind::SongWaveform => "song:wave:",
            KeyKind::TopSongs => "top:songs",
            KeyKind::SongList => "songs:list:",
            KeyKind::ArtistMeta => "artist:meta:",
            KeyKind::ArtistList => "artists:list:",
            KeyKind::AlbumMeta => "album:meta:",
            KeyKind::AlbumList => "album:list:",
            KeyKind::FavoriteList => "favorite:list:",
            KeyKind::ProfileMeta => "profile:meta:",
            KeyKind::MyProfileMeta => "myProfile:meta:",
            KeyKind::SearchQuery => "search:",
            KeyKind::AutocompleteQuery => "autocomplete:",
            KeyKind::HomeFeed => "home",
            KeyKind::UserHistory => "user:",
        }
    }

    /// 是否为按查看者分页的列表键
    pub fn is_paginated(&self) -> bool {
        matches!(
            self,
            KeyKind::SongList | KeyKind::ArtistList | KeyKind::AlbumList | KeyKind::FavoriteList
        )
    }
}

/// 构建缓存键所需的参数
///
/// 未提供的参数会被序列化为固定占位符：查看者为 `guest`，
/// 资源ID为 `_`，页码与分页大小取默认值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyParams<'a> {
    pub id: Option<&'a str>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub viewer: Option<&'a str>,
}

impl<'a> KeyParams<'a> {
    pub fn id(id: &'a str) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn page(page: u32, size: u32, viewer: Option<&'a str>) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
            viewer,
            ..Default::default()
        }
    }
}

/// 转义自由文本参数中的 `%` 和 `:`
fn segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains(|c| c == '%' || c == ':') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn viewer_segment(viewer: Option<&str>) -> Cow<'_, str> {
    match viewer {
        Some(v) if !v.is_empty() => segment(v),
        _ => Cow::Borrowed(GUEST),
    }
}

/// 根据键类型和参数构建缓存键
///
/// 纯函数，不会失败：相同输入总是得到相同的键。
pub fn build_key(kind: KeyKind, params: &KeyParams<'_>) -> CacheKey {
    let id = segment(params.id.unwrap_or(MISSING_ID));
    let page = params.page.unwrap_or(FIRST_PAGE);
    let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE);
    let viewer = viewer_segment(params.viewer);
    let prefix = kind.prefix();

    let raw = match kind {
        KeyKind::TopSongs | KeyKind::HomeFeed => prefix.to_string(),
        KeyKind::SongList | KeyKind::ArtistList | KeyKind::AlbumList | KeyKind::FavoriteList => {
            format!("{}{}:page{}:size{}", prefix, viewer, page, size)
        }
        KeyKind::UserHistory => format!("{}{}:listens", prefix, viewer),
        KeyKind::SongMeta
        | KeyKind::SongRecommend
        | KeyKind::SongWaveform
        | KeyKind::ArtistMeta
        | KeyKind::AlbumMeta
        | KeyKind::ProfileMeta
        | KeyKind::MyProfileMeta
        | KeyKind::SearchQuery
        | KeyKind::AutocompleteQuery => format!("{}{}", prefix, id),
    };
    CacheKey(raw)
}

pub fn song_meta(id: &str) -> CacheKey {
    build_key(KeyKind::SongMeta, &KeyParams::id(id))
}

pub fn song_recommend(id: &str) -> CacheKey {
    build_key(KeyKind::SongRecommend, &KeyParams::id(id))
}

pub fn song_waveform(id: &str) -> CacheKey {
    build_key(KeyKind::SongWaveform, &KeyParams::id(id))
}

pub fn top_songs() -> CacheKey {
    build_key(KeyKind::TopSongs, &KeyParams::default())
}

pub fn song_list(page: u32, size: u32, viewer: Option<&str>) -> CacheKey {
    build_key(KeyKind::SongList, &KeyParams::page(page, size, viewer))
}

pub fn artist_meta(id: &str) -> CacheKey {
    build_key(KeyKind::ArtistMeta, &KeyParams::id(id))
}

pub fn artist_list(page: u32, size: u32, viewer: Option<&str>) -> CacheKey {
    build_key(KeyKind::ArtistList, &KeyParams::page(page, size, viewer))
}

pub fn album_meta(id: &str) -> CacheKey {
    build_key(KeyKind::AlbumMeta, &KeyParams::id(id))
}

pub fn album_list(page: u32, size: u32, viewer: Option<&str>) -> CacheKey {
    build_key(KeyKind::AlbumList, &KeyParams::page(page, size, viewer))
}

pub fn favorite_list(page: u32, size: u32, viewer: Option<&str>) -> CacheKey {
    build_key(KeyKind::FavoriteList, &KeyParams::page(page, size, viewer))
}

pub fn profile_meta(id: &str) -> CacheKey {
    build_key(KeyKind::ProfileMeta, &KeyParams::id(id))
}

pub fn my_profile_meta(id: &str) -> CacheKey {
    build_key(KeyKind::MyProfileMeta, &KeyParams::id(id))
}

pub fn search(query: &str) -> CacheKey {
    build_key(KeyKind::SearchQuery, &KeyParams::id(query))
}

pub fn autocomplete(query: &str) -> CacheKey {
    build_key(KeyKind::AutocompleteQuery, &KeyParams::id(query))
}

pub fn home() -> CacheKey {
    build_key(KeyKind::HomeFeed, &KeyParams::default())
}

pub fn history(viewer: Option<&str>) -> CacheKey {
    build_key(
        KeyKind::UserHistory,
        &KeyParams {
            viewer,
            ..Default::default()
        },
    )
}

/// 转义 Redis glob 元字符，使字面量可以安全地嵌入匹配模式
pub fn glob_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 匹配某类分页列表全部键的模式
///
/// 传入查看者时只匹配该查看者的所有页；非分页类型返回 `None`。
pub fn list_pattern(kind: KeyKind, viewer: Option<&str>) -> Option<String> {
    if !kind.is_paginated() {
        return None;
    }
    match viewer {
        Some(_) => Some(format!(
            "{}{}:*",
            kind.prefix(),
            glob_escape(&viewer_segment(viewer))
        )),
        None => Some(format!("{}*", kind.prefix())),
    }
}

/// 匹配以给定前缀开头的全部自动补全查询
pub fn autocomplete_prefix_pattern(prefix: &str) -> String {
    format!(
        "{}{}*",
        KeyKind::AutocompleteQuery.prefix(),
        glob_escape(&segment(prefix))
    )
}
