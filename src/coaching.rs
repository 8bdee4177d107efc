//! Coaching text generation from structured feedback.
//!
//! The network LLM client lives outside this crate; it plugs in through
//! [`CoachingBackend`]. [`OfflineCoach`] is the built-in fallback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::swing::FeedbackItem;

pub const DEFAULT_SKILL: &str = "drive_forehand";

/// バックエンドが失敗・空応答の場合の返答
pub const FALLBACK_COACHING: &str =
    "Great effort on your shadow swing! Keep practicing and you'll see improvement!";

const BUILTIN_SYSTEM_PROMPT: &str = "You are a friendly pickleball coach. \
The user recorded a shadow drive swing and a motion-analysis system produced \
structured feedback with a code, issue, severity and tip. Explain the issue in \
plain language, give one or two concrete drills, and keep the answer short and \
encouraging.";

const FEEDBACK_PREAMBLE: &str =
    "Here is the structured feedback data generated from motion analysis:\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// スキル別のシステムプロンプトを読む
///
/// `<skill>_prompt.txt` → `drive_forehand_prompt.txt` → 組み込みプロンプトの順。
pub fn load_system_prompt(prompts_dir: Option<&Path>, skill: &str) -> Result<String> {
    let Some(dir) = prompts_dir else {
        return Ok(BUILTIN_SYSTEM_PROMPT.to_string());
    };
    for name in [skill, DEFAULT_SKILL] {
        let path = dir.join(format!("{}_prompt.txt", name));
        if path.is_file() {
            return fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt {}", path.display()));
        }
    }
    Ok(BUILTIN_SYSTEM_PROMPT.to_string())
}

/// LLM に渡すメッセージ列を組み立てる
pub fn build_messages(
    feedback: &[FeedbackItem],
    skill: &str,
    prompts_dir: Option<&Path>,
    question: Option<&str>,
) -> Result<Vec<ChatMessage>> {
    let system_prompt = load_system_prompt(prompts_dir, skill)?;
    let feedback_json = serde_json::to_string_pretty(feedback)?;

    let mut messages = vec![
        ChatMessage::new(Role::System, system_prompt),
        ChatMessage::new(Role::User, format!("{}{}", FEEDBACK_PREAMBLE, feedback_json)),
    ];
    if let Some(q) = question.map(str::trim).filter(|q| !q.is_empty()) {
        messages.push(ChatMessage::new(Role::User, q));
    }
    Ok(messages)
}

/// 自然言語コーチングの生成元
pub trait CoachingBackend {
    fn reply(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// LLM 未設定時のキーワードベースの返答
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCoach;

impl CoachingBackend for OfflineCoach {
    fn reply(&self, messages: &[ChatMessage]) -> Result<String> {
        Ok(offline_reply(messages).to_string())
    }
}

fn offline_reply(messages: &[ChatMessage]) -> &'static str {
    if messages.is_empty() {
        return "No feedback available.";
    }

    let user: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    let question = user.last().copied().unwrap_or_default().to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| question.contains(w));

    if has(&["improve", "better", "how can i"]) {
        "To improve this technique, I recommend:\n\n\
         1. **Focus on Form**: Pay attention to the key issues identified in your analysis. Work on correcting one issue at a time.\n\n\
         2. **Practice Regularly**: Aim for 15-30 minutes of focused practice daily. Consistency is more important than duration.\n\n\
         3. **Use Video Feedback**: Record yourself regularly to track your progress and identify areas that still need work.\n\n\
         4. **Shadow Practice**: Practice the movements without equipment to build muscle memory for proper form.\n\n\
         You should see noticeable improvement within 2-4 weeks of consistent practice. Keep at it!"
    } else if has(&["schedule"]) {
        "For optimal improvement, here's a recommended practice schedule:\n\n\
         • **Daily**: 15-30 minutes of focused technique work\n\
         • **3-4 times per week**: Shadow practice with video reference\n\
         • **Weekly**: Record and analyze your technique to track progress\n\
         • **Rest Days**: Take 1-2 days off per week for recovery\n\n\
         Remember: Quality over quantity. Short, focused sessions are better than long, unfocused ones."
    } else if has(&["routine", "daily practice"]) {
        "Here's a recommended daily practice routine:\n\n\
         1. **Warm-up (5 min)**: Light stretching and movement to prepare your body\n\
         2. **Technique Focus (10-15 min)**: Work on specific issues from your analysis\n\
         3. **Shadow Practice (5-10 min)**: Mimic proper form without equipment\n\
         4. **Cool-down (5 min)**: Review what you worked on and plan for next session\n\n\
         Total time: 25-35 minutes. Focus on proper form throughout!"
    } else if has(&["time", "long", "when", "timeline"]) {
        "Here's a realistic timeline for improvement:\n\n\
         • **Weeks 1-2**: Focus on understanding and correcting form issues identified in your analysis\n\
         • **Weeks 3-4**: Begin to see muscle memory developing, movements feel more natural\n\
         • **Weeks 5-8**: Noticeable improvement in technique consistency\n\
         • **Month 3+**: Significant improvement with continued practice\n\n\
         Everyone progresses at different rates. Stay consistent, be patient, and celebrate small wins along the way!"
    } else if has_analysis_context(&user) {
        "Thank you for your question! Based on your analysis, I recommend:\n\n\
         • Focus on the key issues mentioned in your feedback\n\
         • Practice 15-30 minutes daily with proper form\n\
         • Record yourself regularly to track progress\n\
         • Work on one technique aspect at a time\n\n\
         You should see improvement within 2-4 weeks of consistent practice. Keep up the great work!"
    } else {
        "Thank you for your question! Based on the analysis, I recommend focusing on the key areas mentioned in the feedback. \
         For best results, practice 15-30 minutes daily, focusing on one technique at a time. \
         You should see improvement within 2-4 weeks of consistent practice."
    }
}

/// 最初のユーザーメッセージが解析結果の文脈を含むか（質問が続く場合のみ）
fn has_analysis_context(user: &[&str]) -> bool {
    if user.len() < 2 {
        return false;
    }
    let context = user[0].to_lowercase();
    context.contains("coaching feedback") || context.contains("technical issues")
}
