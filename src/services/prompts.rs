//! Prompt text sent to the AI gateway.

use crate::models::poetry::PoetryRecord;
use crate::services::ai_gateway::CompletionRequest;

const PROOFREAD_SYSTEM_PROMPT: &str = "你是一个专业的古诗校对专家。";

/// Proofreading request: fix typos and punctuation, answer with the poem only.
pub fn verification_request(poetry: &PoetryRecord) -> CompletionRequest {
    let user_prompt = format!(
        "你是一个古诗专家。请检查以下古诗内容，纠正其中的错别字和标点符号错误。\n\
         如果内容完全正确，直接返回原文。\n\
         如果有错误，返回纠正后的内容。\n\
         只返回纠正后的诗词内容，不要添加任何解释或说明。\n\
         \n\
         诗词标题：{title}\n\
         作者：{author}\n\
         朝代：{dynasty}\n\
         内容：\n\
         {content}",
        title = poetry.title,
        author = poetry.author,
        dynasty = poetry.dynasty,
        content = poetry.content,
    );

    CompletionRequest {
        system_prompt: PROOFREAD_SYSTEM_PROMPT.to_string(),
        user_prompt,
        temperature: 0.3,
        max_tokens: 1000,
    }
}

/// Ink-wash illustration prompt for a poem.
pub fn illustration_prompt(poetry: &PoetryRecord) -> String {
    format!(
        "创作一幅中国古典水墨画风格的图片，展现以下古诗的意境：\n\
         \n\
         诗词：《{title}》\n\
         作者：{author}（{dynasty}）\n\
         内容：{content}\n\
         \n\
         要求：\n\
         1. 采用中国传统水墨画风格\n\
         2. 色调淡雅，意境悠远\n\
         3. 体现诗词中描写的景象和情感\n\
         4. 构图优美，适合作为诗词配图",
        title = poetry.title,
        author = poetry.author,
        dynasty = poetry.dynasty,
        content = poetry.content,
    )
}
