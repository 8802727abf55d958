//! Prompt templates and builders for every model call in the pipeline.
//!
//! Templates are Chinese because the specialists, triage and the team
//! aggregation all answer in Chinese. Builders fill templates with the
//! report, the candidate roster or the specialist results.

use std::fmt::Write;

use serde_json::Value;

/// Placeholder for the case report inside specialist templates.
pub const REPORT_PLACEHOLDER: &str = "{medical_report}";

/// Template used for any role without a dedicated one.
///
/// `{role}` is replaced by the role name when the roster is built.
pub const DEFAULT_SPECIALIST_TEMPLATE: &str = "请以{role}的身份分析以下报告：{medical_report}";

/// Triage instructions; `{specialists}` and `{report}` are filled in.
pub const TRIAGE_PROMPT: &str = r#"你是一位经验丰富的全科分诊医生。
请阅读以下患者的医疗报告，并从给定的专科医生列表中，挑选出最需要参与会诊的科室。

可用专科列表：{specialists}

患者报告：
{report}

请遵循以下原则：
1. 选择与症状最直接相关的科室（例如腹痛选消化科，皮疹选皮肤科）。
2. 如果病情复杂，可选择多个相关科室（通常 2-5 个）。
3. 必须只返回一个 JSON 数组，包含选中的科室名称字符串。不要返回任何其他文字。

示例输出：
["消化科医生", "心理医生"]
"#;

/// Instructions for each reasoning step; the state JSON is appended.
pub const REASONING_PROMPT: &str = concat!(
    "你是一支多学科医疗团队，正在使用 ReAct 策略进行推理。",
    "请只输出一个 JSON，对象格式如下：",
    "{",
    "  \"thought\": \"当前一步的思考\",",
    "  \"tool\": \"generate_structured_diagnosis\" 或 null,",
    "  \"args\": { ... } 或 null,",
    "  \"final_answer\": 如果已经完成推理则给出最终面向患者的中文总结，否则为 null",
    "}",
    "。不要输出除该 JSON 外的任何文字。",
    "非常重要的规则：",
    "1）当 last_observation 为 null 时，你必须设置 tool = \"generate_structured_diagnosis\"，",
    "   且 args 必须是形如 {\"issues\": [...]} 的对象，issues 数组不能为空，",
    "   每个元素需包含 name、reason、suggestion。",
    "2）当 last_observation 中已经包含非空的 issues 时，你必须设置 tool = null, args = null，",
    "   并在 final_answer 中给出面向患者的中文总结，不要再调用任何工具。",
);

/// Default plain aggregation template used when structured reasoning
/// yields nothing. Placeholders: `{specialists_text}`, `{reports_text}`.
pub const AGGREGATION_TEMPLATE: &str = r#"请以多学科医疗团队的身份进行推理。
你将获得以下专科医生提供的患者报告：{specialists_text}。
任务：综合全部报告，列出 3 个可能的健康问题，并逐条说明对应理由与后续建议。
输出格式：仅返回 3 个要点的列表，每个要点包含"问题 + 理由/建议"。

{reports_text}
"#;

/// Stable English keys for the built-in roles, used in reasoning state.
const ROLE_KEYS: [(&str, &str); 13] = [
    ("心脏科医生", "cardiology"),
    ("心理医生", "psychology"),
    ("精神科医生", "psychiatry"),
    ("肺科医生", "pulmonology"),
    ("神经科医生", "neurology"),
    ("内分泌科医生", "endocrinology"),
    ("免疫科医生", "immunology"),
    ("消化科医生", "gastroenterology"),
    ("皮肤科医生", "dermatology"),
    ("肿瘤科医生", "oncology"),
    ("血液科医生", "hematology"),
    ("肾脏科医生", "nephrology"),
    ("风湿科医生", "rheumatology"),
];

/// Returns the English state key for a role; unknown roles keep their name.
#[must_use]
pub fn role_key(role: &str) -> &str {
    ROLE_KEYS
        .iter()
        .find(|(name, _)| *name == role)
        .map_or(role, |(_, key)| key)
}

/// Builds the triage prompt.
#[must_use]
pub fn build_triage_prompt(report: &str, candidates: &[String]) -> String {
    TRIAGE_PROMPT
        .replace("{specialists}", &candidates.join(", "))
        .replace("{report}", report)
}

/// Fills a specialist template with the report.
///
/// A template without the placeholder gets the report appended.
#[must_use]
pub fn render_specialist_prompt(template: &str, report: &str) -> String {
    if template.contains(REPORT_PLACEHOLDER) {
        template.replace(REPORT_PLACEHOLDER, report)
    } else {
        format!("{}\n\n医疗报告：{report}", template.trim_end())
    }
}

/// Builds one reasoning-step prompt from the serialised state.
#[must_use]
pub fn build_reasoning_prompt(state: &Value) -> String {
    format!("{REASONING_PROMPT}\n当前状态：{state}")
}

/// Builds the plain aggregation prompt from `(role, opinion)` pairs.
#[must_use]
pub fn build_aggregation_prompt(template: &str, opinions: &[(&str, &str)]) -> String {
    let specialists_text = opinions
        .iter()
        .map(|(role, _)| *role)
        .collect::<Vec<_>>()
        .join("、");

    let mut reports_text = String::new();
    for (role, opinion) in opinions {
        let _ = writeln!(reports_text, "{role}报告：{opinion}");
    }

    template
        .replace("{specialists_text}", &specialists_text)
        .replace("{reports_text}", reports_text.trim_end())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_build_triage_prompt() {
        let prompt = build_triage_prompt("腹痛三天", &["消化科医生".to_string(), "心理医生".to_string()]);
        assert!(prompt.contains("可用专科列表：消化科医生, 心理医生"));
        assert!(prompt.contains("腹痛三天"));
        assert!(!prompt.contains("{report}"));
    }

    #[test]
    fn test_render_specialist_prompt() {
        let prompt = render_specialist_prompt("请以A的身份分析：{medical_report}", "R");
        assert_eq!(prompt, "请以A的身份分析：R");

        let appended = render_specialist_prompt("请分析。\n", "R");
        assert_eq!(appended, "请分析。\n\n医疗报告：R");
    }

    #[test]
    fn test_build_aggregation_prompt() {
        let prompt = build_aggregation_prompt(
            AGGREGATION_TEMPLATE,
            &[("心脏科医生", "心律不齐"), ("心理医生", "焦虑")],
        );
        assert!(prompt.contains("患者报告：心脏科医生、心理医生。"));
        assert!(prompt.contains("心脏科医生报告：心律不齐\n心理医生报告：焦虑"));
    }

    #[test]
    fn test_reasoning_prompt_embeds_state() {
        let prompt = build_reasoning_prompt(&json!({"last_observation": null}));
        assert!(prompt.starts_with("你是一支多学科医疗团队"));
        assert!(prompt.ends_with("当前状态：{\"last_observation\":null}"));
    }

    #[test]
    fn test_role_key() {
        assert_eq!(role_key("心脏科医生"), "cardiology");
        assert_eq!(role_key("营养科医生"), "营养科医生");
    }
}
