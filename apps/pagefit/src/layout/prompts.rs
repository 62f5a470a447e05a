//! LLM prompt constants for importance ranking during adaptive reduction.
//!
//! The prompt instructs the model to return `{"removal_suggestions": [...]}` JSON only.
//! Callers deserialize via `llm.call_json::<RankingResponse>()`.

// ────────────────────────────────────────────────────────────────────────────
// Ranking prompt (résumé over its page budget)
// ────────────────────────────────────────────────────────────────────────────

pub const RANK_SYSTEM: &str = "\
You are a résumé editor. A résumé is over its page budget. Rank its content by relevance \
to the target role, impact, and recency, and suggest the lowest-priority items to remove.\n\
\n\
Respond with valid JSON only.\n\
Do NOT use markdown code fences. Do NOT add any explanation outside the JSON object.";

pub const RANK_PROMPT_TEMPLATE: &str = "\
The résumé is estimated at {estimated_pages} pages; the target is {target_pages} pages.\n\
About {lines_needed} lines must be removed.\n\
\n\
TARGET ROLE: {target_role}\n\
JOB KEYWORDS: {keywords}\n\
SUMMARY LENGTH: {summary_words} words\n\
\n\
EXPERIENCES (index: title at organization, then [bullet index] text):\n\
{experiences}\n\
\n\
PROJECTS (index: name, then [bullet index] text):\n\
{projects}\n\
\n\
SKILLS (index:name): {skills}\n\
\n\
REMOVAL RULES:\n\
1. List removals lowest priority first\n\
2. Prefer skills and individual bullets over whole projects or experiences\n\
3. Never remove the first bullet of an entry or the only experience\n\
4. Use only the indices shown above\n\
\n\
Return JSON only:\n\
{\"removal_suggestions\": [\n\
  {\"type\": \"skill\", \"index\": 0, \"reason\": \"...\", \"estimated_savings_lines\": 1},\n\
  {\"type\": \"bullet\", \"section\": \"experience\", \"entry\": 0, \"bullet\": 2, \"reason\": \"...\", \"estimated_savings_lines\": 2},\n\
  {\"type\": \"project\", \"index\": 0, \"reason\": \"...\", \"estimated_savings_lines\": 6},\n\
  {\"type\": \"experience\", \"index\": 0, \"reason\": \"...\", \"estimated_savings_lines\": 8},\n\
  {\"type\": \"summary_words\", \"count\": 10, \"reason\": \"...\", \"estimated_savings_lines\": 1}\n\
]}";
