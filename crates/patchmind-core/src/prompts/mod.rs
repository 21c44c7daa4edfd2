//! Prompt templates for the generation workflows, plus the renderer that
//! substitutes `{placeholder}` values into them.

use std::collections::HashMap;
use tracing::error;

use crate::error::{PatchError, Result};

/// Substitutes `{name}` placeholders in a template. `{{` and `}}` are
/// literal braces. A placeholder with no value is an error — callers fall
/// back to a degraded prompt rather than aborting the run.
pub fn render(template: &str, placeholders: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(PatchError::PromptFormat(format!(
                                "unterminated placeholder '{{{name}'"
                            )))
                        }
                    }
                }
                match placeholders.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(PatchError::PromptFormat(format!(
                            "missing placeholder '{name}'"
                        )))
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Renders a template, degrading to the raw query text when formatting
/// fails. A template mistake must never kill a run.
pub fn render_or_query(template: &str, placeholders: &HashMap<&str, String>) -> String {
    match render(template, placeholders) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!("prompt formatting failed, falling back to raw query: {e}");
            placeholders.get("query").cloned().unwrap_or_default()
        }
    }
}

// ── Planner ─────────────────────────────────────────────────

/// Input: {query}, {code_context}, {chat_history}, {rag_context}, {local_context}
pub const PLANNER_TEMPLATE: &str = r#"You are a planning module for a coding assistant. Your task is to create a simple, step-by-step plan based *directly* on the provided context and query.

**Input:**
* **User Query:** {query}
* **Code Context:**
```
{code_context}
```
* **Chat History:**
```
{chat_history}
```
* **RAG Context:**
```
{rag_context}
```
* **Local Context:**
```
{local_context}
```

**Instructions:**
1.  Read the query carefully.
2.  Find relevant code sections or discussion points in the code context and chat history that directly relate to the query.
3.  If specific technical terms, function names, or variables are unclear, look them up first in the local context and then in the RAG context.
4.  Generate a numbered list of concrete actions needed to address the query.
5.  Focus on *what* to do (e.g., "Locate function 'X' in file 'Y'", "Modify lines A-B in 'Y' to include Z").
6.  Keep the plan short and direct. Avoid explanations.
7.  If the query cannot be answered with the context, state "Information needed: [specify missing information]".

**Output:**
Provide *only* the numbered plan.

**Plan:**
"#;

// ── Critic ──────────────────────────────────────────────────

/// Input: planner placeholders plus {proposed_plan}
pub const CRITIC_TEMPLATE: &str = r#"You are a Critic and Reviser module for a coding assistant's plan. Evaluate the proposed plan against the query, approve it if good, revise it if bad, and output strict JSON.

**Input:**
* **User Query:** {query}
* **Code Context:** (Reference Only)
```
{code_context}
```
* **Chat History:** (Reference Only)
```
{chat_history}
```
* **RAG Context:** (Reference Only)
```
{rag_context}
```
* **Local Context:** (Reference Only)
```
{local_context}
```
* **Proposed Plan:**
```
{proposed_plan}
```

**Evaluation Criteria:**
* **Directness:** Does the plan directly address the query with concrete steps?
* **Context Use:** Does the plan primarily use the code context and chat history, with RAG/local context only for definitions?
* **Actionability:** Are the steps clear, specific actions (find, modify, list)?

**Instructions:**
1.  Assess the proposed plan against the criteria.
2.  If the plan meets all criteria, set `plan_status` to `GOOD`, give a brief `critique_reasoning`, and set `revised_plan` to `null`.
3.  If the plan fails any criteria, set `plan_status` to `BAD`, explain which criteria failed in `critique_reasoning`, and produce a `revised_plan` (a new numbered list of steps) that fixes the problems.
4.  Output a single JSON object, strictly matching the schema below, with no text outside it.

**Output Schema (JSON):**
```json
{{
  "plan_status": "GOOD | BAD",
  "critique_reasoning": "string | null",
  "revised_plan": ["string - step 1", "string - step 2"] | null
}}
```
"#;

// ── Executor ────────────────────────────────────────────────

/// Input: planner placeholders plus {final_plan} and {user_prompts}
pub const EXECUTOR_TEMPLATE: &str = r#"You are the execution module for a coding assistant. Execute the provided plan step-by-step.

**Input:**
* **User Query:** {query} (for reference)
* **Code Context:**
```
{code_context}
```
* **Chat History:**
```
{chat_history}
```
* **RAG Context:**
```
{rag_context}
```
* **Local Context:**
```
{local_context}
```
* **Final Plan:**
```
{final_plan}
```
* **User Prompts (Reinforce Expectations):**
```
{user_prompts}
```

**Instructions:**
1.  Carefully follow each numbered step in the final plan.
2.  Use the exact information present in the contexts as instructed by the plan steps.
3.  When providing modified code, use the file markers `### START FILE: path/to/file.ext ###` and `### END FILE: path/to/file.ext ###` around the full changed snippet.
4.  Do not add explanations, greetings, or conversational text. Be completely direct.

**Output:**
Provide *only* the direct result of executing the plan steps.
"#;

// ── Direct Executor (critic bypass) ─────────────────────────

/// Input: planner placeholders plus {user_prompts}
pub const DIRECT_EXECUTOR_TEMPLATE: &str = r#"You are an expert coding assistant. Directly address the user's query using the provided context.

**Input:**
* **User Query:** {query}
* **Code Context:**
```
{code_context}
```
* **Chat History:**
```
{chat_history}
```
* **RAG Context:**
```
{rag_context}
```
* **Local Context:**
```
{local_context}
```
* **User Prompts (Reinforce Expectations):**
```
{user_prompts}
```

**Instructions:**
1.  Analyze the query and all provided context sections.
2.  Generate the necessary code modifications, explanations, or answers directly.
3.  When modifying code, wrap the full changed snippet in the markers `### START FILE: path/to/file.ext ###` and `### END FILE: path/to/file.ext ###`.
4.  Be concise and direct; no greetings or filler.
5.  If the query cannot be answered with the given context, say so and name what is missing.

**Output:**
Provide *only* the direct response to the query.
"#;

// ── RAG query summarizer ────────────────────────────────────

/// Input: {chat_history}, {original_query}
pub const RAG_SUMMARIZER_TEMPLATE: &str = r#"You are an AI assistant that creates search queries. Analyze the chat history and latest query to make a concise search query.

**Chat History:**
{chat_history}

**Latest User Query:**
{original_query}

**Instructions:**
1.  Find the main technical topic or problem.
2.  Extract key technical terms: function names, class names, library names, error messages, language, core concepts.
3.  Ignore greetings, thanks, and filler words.
4.  Combine the most important technical terms into a short search query string (typically 3-7 words).

**Output:**
Provide *only* the search query string.

Search Query:
"#;
