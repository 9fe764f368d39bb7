//! Script polish skills: an immutable prompt registry with a fallback key.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Skill used for empty or unrecognized names.
pub const FALLBACK_SKILL: &str = "polish_master";

/// Prompt language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLanguage {
    #[default]
    En,
    Zh,
}

impl PromptLanguage {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Self::Zh,
            _ => Self::En,
        }
    }
}

#[derive(Debug)]
pub struct PolishSkill {
    pub name: &'static str,
    system_prompt_en: &'static str,
    system_prompt_zh: &'static str,
    user_prompt_en: &'static str,
    user_prompt_zh: &'static str,
}

impl PolishSkill {
    pub fn system_prompt(&self, language: PromptLanguage) -> &'static str {
        match language {
            PromptLanguage::En => self.system_prompt_en,
            PromptLanguage::Zh => self.system_prompt_zh,
        }
    }

    /// User prompt with `content` substituted.
    pub fn user_prompt(&self, language: PromptLanguage, content: &str) -> String {
        let template = match language {
            PromptLanguage::En => self.user_prompt_en,
            PromptLanguage::Zh => self.user_prompt_zh,
        };
        template.replace("{content}", content)
    }
}

const POLISH_MASTER_SYSTEM_EN: &str = r#"You are "Polish Master" and also a "Script Expander". Pick a mode from the input and output save-ready episode text.

Mode A: Polish mode (the input is already a drafted chapter)
1. Improve quality without changing facts, timeline, character relationships or core plot.
2. Improve clarity, rhythm, imagery and emotional impact; remove redundancy.
3. Preserve structure and information density.

Mode B: Keyword-to-script mode (the input is only one or two keywords, a short phrase, a title or very short text)
1. Expand into a complete script-like story; never return only a title or outline.
2. Output at least 6 paragraphs with clear plot progression: setup, development, conflict, twist, ending.
3. Include at least 2 scene transitions and dialogue with clear motivation and causal flow.
4. Make it directly usable as an editable chapter draft.

Output rules:
1. Output only the final text. No explanations or meta commentary.
2. Do not add prefixes like "Polished:" or "Expanded:".
3. Do not output markdown code blocks."#;

const POLISH_MASTER_SYSTEM_ZH: &str = r#"你是“润色大师”，也是“剧本扩写师”。根据输入内容自动选择模式并直接产出可保存正文。

模式A：润色模式（输入已是成段章节）
1. 不改变剧情事实、人物关系、时间线和核心信息，提升表达质量。
2. 优化通顺度、节奏、画面感、情绪张力，删除重复和赘述。
3. 保持原有结构与信息密度。

模式B：关键词扩写模式（输入仅有关键词、短语、标题或很短的文本）
1. 扩写成完整剧本故事，不可只返回标题或提纲。
2. 输出至少6段连续正文，包含开端、发展、冲突、转折、结尾。
3. 至少包含2个场景转换与人物对白。
4. 适合直接作为章节草稿继续编辑。

输出规则：
1. 只输出最终正文，不要解释。
2. 不要输出“润色后：”“扩写后：”等前缀。
3. 不要输出 Markdown 代码块。"#;

const POLISH_MASTER_USER_EN: &str =
    "Please polish or expand the following input and output only the final save-ready chapter text:\n\n[Original Episode]\n{content}";

const POLISH_MASTER_USER_ZH: &str =
    "请根据以下章节输入进行“润色或扩写”，并直接输出可保存的完整正文：\n\n【章节原文】\n{content}";

static POLISH_MASTER: PolishSkill = PolishSkill {
    name: FALLBACK_SKILL,
    system_prompt_en: POLISH_MASTER_SYSTEM_EN,
    system_prompt_zh: POLISH_MASTER_SYSTEM_ZH,
    user_prompt_en: POLISH_MASTER_USER_EN,
    user_prompt_zh: POLISH_MASTER_USER_ZH,
};

static SKILLS: Lazy<HashMap<&'static str, &'static PolishSkill>> = Lazy::new(|| {
    let mut skills = HashMap::new();
    skills.insert(POLISH_MASTER.name, &POLISH_MASTER);
    skills
});

/// Look up a skill by case-insensitive name, falling back to [`FALLBACK_SKILL`].
pub fn resolve_skill(name: &str) -> &'static PolishSkill {
    let key = name.trim().to_lowercase();
    SKILLS.get(key.as_str()).copied().unwrap_or(&POLISH_MASTER)
}

/// Registered skill names, sorted.
pub fn skill_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = SKILLS.keys().copied().collect();
    names.sort_unstable();
    names
}

const FENCE_OPENERS: [&str; 3] = ["```text", "```markdown", "```"];

const LEADING_LABELS: [&str; 4] = [
    "润色后：",
    "润色结果：",
    "Polished version:",
    "Refined text:",
];

/// Strip code fences and leading "Polished version:"-style labels.
pub fn normalize_polished_output(raw: &str) -> String {
    let mut out = raw.trim();

    if let Some(opener) = FENCE_OPENERS.iter().find(|f| out.starts_with(*f)) {
        out = &out[opener.len()..];
    }
    out = out.strip_suffix("```").unwrap_or(out).trim();

    for label in LEADING_LABELS {
        let matched = out
            .get(..label.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(label));
        if matched {
            out = out[label.len()..].trim();
            break;
        }
    }

    out.to_string()
}
