// SPDX-License-Identifier: MIT

//! Prompt templates, one per LLM task unit

use crate::adk::chain::PromptTemplate;

const JSON_ONLY: &str =
    "Output must be a valid JSON value only. Do NOT include ``` or any Markdown formatting.";

pub fn resume_prompt() -> PromptTemplate {
    PromptTemplate::new(
        format!(
            r#"# Role
You are a recruiting assistant that extracts the applicant's position, tech stack, career length and notable facts from a résumé.
Read the résumé in <Resume> and answer in the format of <Style>.

# Resume
{{resume}}

# Style
- position: job category (AI engineer, ML engineer, DevOps engineer, ML researcher, backend engineer, ...)
- tech_stacks: languages, frameworks and libraries the applicant uses (Python, Go, React, Kubernetes, ...)
- years: career length ("new graduate" without experience, otherwise "N years"; internships do not count)
- awards: awards received
- certifications: certificates held
- etcetra: anything else notable (military service exemption, veteran status, ...)

{JSON_ONLY} Return one JSON object."#
        ),
        &["resume"],
    )
}

pub fn experiences_prompt() -> PromptTemplate {
    PromptTemplate::new(
        format!(
            r#"# Role
You are a recruiting assistant that extracts employment history from a résumé.
Read the résumé in <Resume> and follow <Style>.

# Resume
{{resume}}

# Style
Return a JSON list with one object per employer:
- company(str): the company name only
- period(int): years at the company, null when not stated
- role(str): the role held there

{JSON_ONLY}"#
        ),
        &["resume"],
    )
}

pub fn projects_prompt() -> PromptTemplate {
    PromptTemplate::new(
        format!(
            r#"# Role
You are a recruiting assistant that extracts projects from a résumé.
Read the résumé in <Resume> and follow <Style>.
Include side projects as well as projects carried out at a company.

# Resume
{{resume}}

# Style
Return a JSON list with one object per project:
- title(str): project name
- achievements(list[str]): what the project achieved
- period(int): duration in months, null when not stated
- role(str): the applicant's role in the project
- team(bool): false for a solo project
- company(str | null): the company the project was done at, name only

{JSON_ONLY}"#
        ),
        &["resume"],
    )
}

pub fn jd_prompt() -> PromptTemplate {
    PromptTemplate::new(
        format!(
            r#"# Role
You are a recruiting assistant that extracts the title, requirements and preferences from a job description.
Read <Job Description> and answer in the format of <Style>.

# Job Description
{{job_description}}

# Style
- title: job title (backend engineer, data scientist, ...)
- company: hiring company name
- company_information: what the company does
- introduction: summary of the role
- responsibilities: main duties
- qualification: required qualifications
- preference: preferred qualifications
- skills: required capabilities
- benefits: benefits and perks
- conditions: working conditions
- process: hiring process (stages, how to apply, schedule)
- tech_stacks: tools, libraries and languages used

Copy every field from the job description verbatim without summarising or editing.
{JSON_ONLY} Return one JSON object."#
        ),
        &["job_description"],
    )
}

pub fn skills_prompt() -> PromptTemplate {
    PromptTemplate::new(
        r#"# Role
You are a senior engineer reviewing a résumé. Assess the applicant's capabilities from <Resume>.

# Resume
{resume_details}

# Style
Write in Markdown with three sections: strengths, gaps, and suggested next steps.
Ground every point in a concrete item from the résumé."#,
        &["resume_details"],
    )
}

pub fn recruit_prompt() -> PromptTemplate {
    PromptTemplate::new(
        r#"# Role
You are a hiring manager judging how well an applicant fits a position.
Compare <Resume> with the position described under <Position>.

# Position
- company: {company}
- about the company: {company_information}
- title: {title}
- introduction: {introduction}
- responsibilities: {responsibilities}
- qualification: {qualification}
- preference: {preference}
- skills: {skills}
- tech stacks: {tech_stacks}

# Resume
{resume_details}

# Style
Write in Markdown: a fit verdict first, then matched requirements, missing requirements and interview focus points."#,
        &[
            "company",
            "company_information",
            "title",
            "introduction",
            "responsibilities",
            "qualification",
            "preference",
            "skills",
            "tech_stacks",
            "resume_details",
        ],
    )
}

pub fn standard_analysis_prompt() -> PromptTemplate {
    PromptTemplate::new(
        r#"# Role
You are a recruiter screening an applicant against the standard requirements of a job description.

# Resume
{resume_details}

# Job Description
{jd_details}

# Style
Go through each qualification and preference in order and mark it met, partially met or not met, citing the résumé."#,
        &["resume_details", "jd_details"],
    )
}

pub fn deep_dives_prompt() -> PromptTemplate {
    PromptTemplate::new(
        r#"# Role
You are a technical interviewer doing a deep dive into an applicant's projects for a specific position.

# Resume
{resume_details}

# Job Description
{jd_details}

# Style
Pick the projects most relevant to the responsibilities, judge their depth and ownership, and list probing interview questions."#,
        &["resume_details", "jd_details"],
    )
}

pub fn overall_prompt() -> PromptTemplate {
    PromptTemplate::new(
        r#"# Role
You are the hiring lead writing the final assessment. Combine the analyses in <Report> into one verdict.

# Report
{report}

# Style
Start with a one-line recommendation, then summarise the evidence. Do not repeat the analyses verbatim."#,
        &["report"],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_declared_variable_has_a_placeholder() {
        let prompts = [
            resume_prompt(),
            experiences_prompt(),
            projects_prompt(),
            jd_prompt(),
            skills_prompt(),
            recruit_prompt(),
            standard_analysis_prompt(),
            deep_dives_prompt(),
            overall_prompt(),
        ];
        for prompt in prompts {
            let values: serde_json::Map<String, serde_json::Value> = prompt
                .input_variables()
                .iter()
                .map(|v| (v.clone(), serde_json::Value::String(format!("<<{}>>", v))))
                .collect();
            let filled = prompt.fill(&values);
            for var in prompt.input_variables() {
                assert!(filled.contains(&format!("<<{}>>", var)), "{}", var);
            }
        }
    }

    #[test]
    fn test_format_braces_are_resolved() {
        let filled = resume_prompt().fill(&serde_json::Map::new());
        assert!(filled.contains("# Resume\n\n"));
        assert!(filled.contains("Do NOT include ```"));
    }
}
