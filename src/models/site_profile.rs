//! 目标网站的页面结构描述
//!
//! 所有选择器和占位文本都在这里，网站改版时只需修改配置，不需要改流程代码。

use serde::Deserialize;

/// 目标网站的页面结构
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    /// 上传按钮候选选择器，按优先级排列
    pub upload_trigger: Vec<String>,
    /// 点击上传按钮后出现的文件输入框候选选择器
    pub file_input: Vec<String>,
    /// "已润色"结果区域
    pub polished_region: String,
    /// "原文"结果区域
    pub raw_region: String,
    /// 通用笔记区域（兜底）
    pub note_regions: String,
    /// 空状态占位文本，出现即表示尚未生成结果
    pub placeholders: Vec<String>,
    /// 兜底区域额外排除的占位片段
    pub note_placeholder_fragments: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::abaii()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SiteProfile {
    /// daotao.abaii.vn 的语音转写页面
    pub fn abaii() -> Self {
        Self {
            upload_trigger: strings(&[
                "button#uploadButton",
                "button.action-button",
                r#"button[title*="Tải lên"]"#,
                r#"button[title*="upload"]"#,
                "#uploadButton",
                ".action-button",
            ]),
            file_input: strings(&[
                r#"input[type="file"]"#,
                r#"input[accept*="audio"]"#,
                r#"input[accept*="video"]"#,
                r#"input[accept*=".mp3"]"#,
                r#"input[accept*=".wav"]"#,
                r#"input[accept*=".mp4"]"#,
            ]),
            polished_region: "#polishedNote".to_string(),
            raw_region: "#rawTranscription".to_string(),
            note_regions: ".note-content".to_string(),
            placeholders: strings(&[
                "Ghi chép đã trau chuốt của bạn sẽ xuất hiện ở đây",
                "Ghi chép nguyên văn sẽ xuất hiện ở đây",
            ]),
            note_placeholder_fragments: strings(&["Ghi chép", "xuất hiện ở đây"]),
        }
    }

    /// 一次性读取所有结果区域文本的脚本
    ///
    /// 返回值可反序列化为 `PageSnapshot`
    pub fn snapshot_script(&self) -> String {
        format!(
            r#"
            (() => {{
                const read = (el) => el ? (el.textContent || el.innerText || '') : null;
                return {{
                    polished: read(document.querySelector({polished})),
                    raw: read(document.querySelector({raw})),
                    notes: Array.from(document.querySelectorAll({notes})).map(read)
                }};
            }})()
            "#,
            polished = js_string(&self.polished_region),
            raw = js_string(&self.raw_region),
            notes = js_string(&self.note_regions),
        )
    }
}

/// 把选择器转成 JS 字符串字面量
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_trigger_prefers_id_selector() {
        let profile = SiteProfile::abaii();
        assert_eq!(profile.upload_trigger[0], "button#uploadButton");
        assert_eq!(profile.file_input[0], r#"input[type="file"]"#);
    }

    #[test]
    fn test_snapshot_script_quotes_selectors() {
        let profile = SiteProfile {
            polished_region: r#"div[data-role="polished"]"#.to_string(),
            ..SiteProfile::abaii()
        };
        let script = profile.snapshot_script();
        assert!(script.contains(r#"document.querySelector("div[data-role=\"polished\"]")"#));
        assert!(script.contains(r##"document.querySelector("#rawTranscription")"##));
        assert!(script.contains(r#"document.querySelectorAll(".note-content")"#));
    }

    #[test]
    fn test_partial_profile_from_toml() {
        let profile: SiteProfile = toml::from_str(
            r##"
            upload_trigger = ["#newUpload"]
            "##,
        )
        .unwrap();
        assert_eq!(profile.upload_trigger, vec!["#newUpload".to_string()]);
        assert_eq!(profile.raw_region, "#rawTranscription");
    }
}
