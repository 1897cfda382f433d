//! 结果提取服务 - 业务能力层
//!
//! 只根据页面快照判断"是否已完成"和"取哪段文本"，不操作页面

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::models::SiteProfile;

/// 结果区域的文本快照
///
/// 区域不存在时对应字段为 `None`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageSnapshot {
    pub polished: Option<String>,
    pub raw: Option<String>,
    #[serde(default)]
    pub notes: Vec<Option<String>>,
}

/// 结果提取器
pub struct ResultExtractor {
    min_text_len: usize,
    placeholders: Vec<String>,
    note_fragments: Vec<String>,
}

impl ResultExtractor {
    pub fn new(profile: &SiteProfile, min_text_len: usize) -> Self {
        Self {
            min_text_len,
            placeholders: profile.placeholders.clone(),
            note_fragments: profile.note_placeholder_fragments.clone(),
        }
    }

    /// 页面是否已生成结果
    ///
    /// 只看"已润色"和"原文"两个区域
    pub fn is_ready(&self, snapshot: &PageSnapshot) -> bool {
        self.plausible(snapshot.polished.as_deref()).is_some()
            || self.plausible(snapshot.raw.as_deref()).is_some()
    }

    /// 按优先级取出结果文本：已润色 → 原文 → 任意笔记区域
    ///
    /// # 参数
    /// - `snapshot`: 页面报告完成后重新读取的快照
    ///
    /// # 返回
    /// 返回去掉首尾空白的文本；没有可用文本时返回 `EmptyResult`
    pub fn extract(&self, snapshot: &PageSnapshot) -> Result<String, ConversionError> {
        if let Some(text) = self.plausible(snapshot.polished.as_deref()) {
            debug!("使用已润色区域的文本");
            return Ok(text.to_string());
        }

        if let Some(text) = self.plausible(snapshot.raw.as_deref()) {
            debug!("使用原文区域的文本");
            return Ok(text.to_string());
        }

        let from_notes = snapshot
            .notes
            .iter()
            .filter_map(|note| self.plausible(note.as_deref()))
            .find(|text| !self.note_fragments.iter().any(|f| text.contains(f.as_str())));
        if let Some(text) = from_notes {
            debug!("使用笔记区域的文本");
            return Ok(text.to_string());
        }

        warn!("⚠️ 页面报告已完成，但没有可用的文本");
        Err(ConversionError::EmptyResult)
    }

    /// 去掉首尾空白后足够长且不是占位文本
    fn plausible<'a>(&self, text: Option<&'a str>) -> Option<&'a str> {
        let trimmed = text?.trim();
        if trimmed.chars().count() <= self.min_text_len {
            return None;
        }
        if self.placeholders.iter().any(|p| trimmed.contains(p.as_str())) {
            return None;
        }
        Some(trimmed)
    }
}
