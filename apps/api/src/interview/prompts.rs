// All LLM prompt templates for the interview engine.
// Placeholders in braces are filled with `str::replace` before sending.

/// Opening question. Replace `{topic}`.
pub const FIRST_QUESTION_PROMPT_TEMPLATE: &str = r#"You are an interviewer assessing a candidate's {topic} skills.
Ask the first question of the interview.
It should be a simple but insightful {topic} question suitable for a beginner or intermediate candidate.
Return only the question text, no explanations, no numbering."#;

/// Follow-up question. Replace `{topic}`, `{prev_question}`, `{prev_answer}`,
/// `{difficulty}` and `{asked_list}`.
pub const FOLLOWUP_PROMPT_TEMPLATE: &str = r#"You are an interviewer assessing a candidate's {topic} skills.
The last question was: "{prev_question}"
The candidate answered: "{prev_answer}"

Now generate ONE new {topic} interview question that follows up naturally.
Difficulty should be {difficulty}.
Do not repeat any of these previous questions:
{asked_list}

Return only the question text, no answers, no numbering."#;

/// Batch evaluation. Replace `{topic}` and `{transcript}`.
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"You are an expert {topic} interviewer.
Evaluate the following Q&A strictly and return JSON ONLY.

Return a JSON array of objects, one per question, in the same order as the transcript:
[{"score": int (0-10), "feedback": "constructive feedback"}, ...]

Transcript:
{transcript}

Instructions:
- Give a score from 0 to 10.
- Feedback must be specific to the answer.
- Do not include any extra text outside JSON."#;
