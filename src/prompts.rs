//! Standing instructions and prompt builders for every pipeline role.
//!
//! All builders are pure functions of their inputs.

pub const OUTLINE_WRITER_INSTRUCTIONS: &str = r#"You are an assistant that proposes the chapter structure of a research report for a given theme.
Analyse the theme broadly and identify every major aspect. Propose a logically ordered set of chapters that together form a coherent report, and describe the purpose of each chapter briefly so the reader can see its intent.
Adjust the structure when you receive feedback or additional requests."#;

pub const OUTLINE_REVIEWER_INSTRUCTIONS: &str = r#"You review proposed research report outlines and point out improvements.
Check coverage of the theme's major aspects, logical order of the chapters, and redundant or unnecessary chapters. For every issue give a concrete reason and a suggested fix.
Only give feedback; never rewrite the outline yourself. When the outline is already of sufficient quality, say that there are no major issues so the work can move on."#;

pub const CHAPTER_PARSER_INSTRUCTIONS: &str = r#"You split a report outline into chapters: number, title and description.
Reply with JSON only, in this exact shape:

```json
{
  "chapters": [
    { "number": 1, "title": "Chapter title", "description": "What the chapter covers" }
  ]
}
```"#;

pub const PHASE_JUDGE_INSTRUCTIONS: &str = r#"You are a review manager. Read the feedback given on an agent's output and decide the next action.
- Send the work back ("revise") when the feedback clearly says it is insufficient, needs fixes or contains errors.
- Move on ("proceed") when the feedback says the quality is sufficient or there are no major issues.
- When the call is borderline, prefer "revise".
Reply with JSON only, in this exact shape:

```json
{ "action": "proceed", "reason": "short explanation" }
```"#;

pub const CONTENT_WRITER_INSTRUCTIONS: &str = r#"You write the detailed content of one chapter of a research report.
Gather recent information from reliable sources. Make the topic sentence of every paragraph clear and keep to the chapter's subject. Cite your sources explicitly with URL, author and year where available."#;

pub const CONTENT_REVIEWER_INSTRUCTIONS: &str = r#"You review a single chapter of a research report and point out improvements.
Introduction and conclusion chapters are added during final assembly, so never send a chapter back for lacking them.
Check that the chapter's question is clear, that the information is sufficient, and that paragraphs follow a logical order. For every issue give a concrete reason and a suggested fix. Only give feedback; never rewrite the chapter yourself."#;

pub const FINAL_REPORT_WRITER_INSTRUCTIONS: &str = r#"You assemble the final version of a research report.
Unify tone and style, add an introduction that states background and purpose, add a conclusion that restates the key points, keep the flow between chapters smooth, and proofread grammar, spelling and terminology."#;

pub const FINAL_REPORT_REVIEWER_INSTRUCTIONS: &str = r#"You review a finished research report and give feedback to improve it.
Check consistency of tone and style, logical order of sections, whether the introduction states background and purpose, whether the conclusion restates the key points, and language correctness. For every issue give a concrete reason and a suggested fix. Only give feedback; never rewrite the report yourself."#;

pub fn outline_writer_prompt(theme: &str) -> String {
    format!(
        r#"Draft a chapter outline for a research report on the following theme.

**Theme:**
{theme}

1. Break the theme into clearly separated subtopics.
2. Propose a chapter title and a short summary for each subtopic.
3. Include an introduction and a conclusion.

Briefly explain why each chapter matters and which angle it investigates."#
    )
}

pub fn outline_reflection_prompt(outline: &str) -> String {
    format!(
        r#"Below is the outline a writing agent proposed for a research report. Evaluate it and point out improvements.

=== OUTLINE ===

{outline}

=== END OF OUTLINE ===

Consider:

1. **Coverage**: are the major aspects of the theme covered?
2. **Consistency**: is the chapter order logical and easy to follow?
3. **Redundancy**: are there overlapping or unnecessary chapters?

Give an assessment for each point and concrete suggestions where needed."#
    )
}

pub fn phase_judge_prompt(phase: &str, output: &str, feedback: &str) -> String {
    format!(
        r#"Below is the feedback a reviewer gave on a writing agent's output.
Based on this feedback, decide whether the work may move to the next phase or must be sent back for revision.

[FEEDBACK]:
{feedback}

[PHASE]:
{phase}

[OUTPUT]:
{output}

Choose one and reply as JSON including the reason:

- send back (action: "revise")
- move on (action: "proceed")

Example:
```json
{{ "action": "proceed", "reason": "The feedback raises no major issues and the quality is sufficient." }}
```"#
    )
}

pub fn content_writer_prompt(title: &str, description: &str) -> String {
    let description = description.trim();
    let description_section = if description.is_empty() {
        String::new()
    } else {
        format!("\n\nChapter description: {description}")
    };
    format!(
        r#"Write the detailed content of the chapter below.

Chapter title: {title}{description_section}

If information is missing after drafting, research it before finalising."#
    )
}

pub fn content_reflection_prompt(title: &str, content: &str) -> String {
    format!(
        r#"Below is a chapter written by an assistant. Evaluate it and point out improvements. Introduction and conclusion chapters are added during final assembly, so do not send a chapter back for lacking them.

Chapter title: {title}

=== CONTENT ===

{content}

=== END OF CONTENT ===

Consider:

1. **Coverage**: are the major aspects of the chapter's subject covered?
2. **Consistency**: is the structure logical and easy to follow?
3. **Redundancy**: is there duplicated or unnecessary material?

Give an assessment for each point and concrete suggestions where needed."#
    )
}

pub fn final_report_writer_prompt(draft: &str) -> String {
    format!(
        r#"Below is the draft of a research report whose chapters are complete. Assemble the final version.

[REPORT DRAFT]:
{draft}

Tasks:

1. Unify tone and style across the report.
2. Add an introduction that gives the reader background and purpose.
3. Add a conclusion that restates the key points and gives a clear takeaway.
4. Make sure chapters and sections connect smoothly and the flow stays logical.
5. Proofread grammar, spelling and terminology for a professional finish."#
    )
}

pub fn final_report_reflection_prompt(report: &str) -> String {
    format!(
        r#"Below is the finished research report. Evaluate it and point out improvements.

[FINAL REPORT]:
{report}

Consider:

1. Is tone and style consistent throughout?
2. Are chapters and sections in a logical order with a smooth flow?
3. Does the introduction state background and purpose, and does the conclusion restate the key points?
4. Are there grammar, spelling or terminology mistakes?

Give an assessment for each point and concrete suggestions where needed."#
    )
}

/// Next-iteration input after a `revise` judgment: prior output plus the critique.
pub fn build_revision_prompt(prior_output: &str, feedback: &str) -> String {
    format!(
        r#"Below is the output you produced previously and the feedback it received.
Revise it according to the feedback and submit the new output.

[PREVIOUS OUTPUT]:
{prior_output}

[FEEDBACK]:
{feedback}

Guidelines:

1. Understand each point raised and address it precisely.
2. Keep structure and style consistent across the whole output.
3. Preserve the original intent and arguments while improving quality.

Reply with the complete revised output."#
    )
}
