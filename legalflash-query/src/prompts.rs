//! Prompt templates for answer generation and query rewriting.
//!
//! Both templates address the model in Chinese, matching the corpus. The
//! answer template stuffs every selected passage verbatim into one context
//! block and instructs the model to admit ignorance rather than fabricate.

/// Template for the final answer prompt. Placeholders: `{context}`,
/// `{question}`.
pub const RAG_PROMPT_TEMPLATE: &str = "\
你是一名专业的法律助手。请根据提供的【上下文】来回答用户的问题。
上下文可能包含法律条文或相关案例。请结合这些信息给出准确、专业的回答。
如果你找不到答案，请诚实地说明你无法找到相关信息，不要编造。

【上下文】：
{context}

用户问题：{question}

请基于上下文中的法律条文和案例，给出详细、准确的法律建议。
";

/// Template for the query-rewrite prompt. Placeholder: `{query}`.
///
/// The few-shot examples anchor the model on terse keyword output; the
/// rewriter still defends against explanation text slipping through.
pub const REWRITE_PROMPT_TEMPLATE: &str = "\
你是一个专业的法律检索助手。请将用户的问题改写为适合法律知识库检索的专业关键词或短语。

改写要求：
1. 保留原问题的核心法律概念
2. 将口语化表达转换为法律术语
3. 提取关键的法律实体和关系
4. 保持简洁，通常不超过20个字
5. 如果是法律条文查询，保留具体的法律名称和条款关键词

示例：
- 用户问题：\"他不还钱咋办？\"
- 改写结果：\"债务违约 违约责任 还款义务\"

- 用户问题：\"合同到期了还能续签吗？\"
- 改写结果：\"合同续签 合同期限 续约\"

- 用户问题：\"工伤怎么赔偿？\"
- 改写结果：\"工伤赔偿 工伤保险 工伤认定\"

现在请改写以下问题：

用户问题：{query}

改写结果（只输出改写后的关键词，不要其他解释）：";

/// Build the final answer prompt from selected passages and the user's
/// question. Passages get 1-based positional labels so the model (and the
/// source previews) can cite them.
#[must_use]
pub fn build_answer_prompt(passages: &[String], question: &str) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[文档 {}]\n{}", i + 1, doc))
        .collect::<Vec<_>>()
        .join("\n\n");

    RAG_PROMPT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

/// Build the rewrite prompt for one user question.
#[must_use]
pub fn build_rewrite_prompt(query: &str) -> String {
    REWRITE_PROMPT_TEMPLATE.replace("{query}", query)
}
