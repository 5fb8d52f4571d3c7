//! Prompt templates for the judge, the run summarizer and the coding agents.
//!
//! The judge prompts are Tera templates rendered with `repo_name`,
//! `issue_desc` and `patch_str`. Values are inserted verbatim (no escaping).

use tera::{Context, Tera};

/// System prompt for both judge modes.
pub const JUDGE_SYSTEM_PROMPT: &str = "You are a software engineer expert at solving bugs.";

/// System prompt for run summaries.
pub const SUMMARIZER_SYSTEM_PROMPT: &str = "You are an expert summarizer of agent's output.";

/// Marker the soft judge answers with when no patch is good enough.
pub const RUN_AGAIN: &str = "RUN AGAIN";

const SEPARATOR_WIDTH: usize = 50;

const COMPARISON_TEMPLATE: &str = r#"
I am facing the following issue in the repo {{ repo_name }}. You have an older version of the codebase, so your belief about the
codebase might be outdated. Some agents tried to solve the issue and generated patches. Your task is to choose the best patch that fixes the issue,
or ask the agents to run again, if you are not confident that the patches fix the issue. To help you, I have also provided a summary of the
run of the agent.

Issue Description:
{{ issue_desc }}

You are given multiple patches and details of the agent's run, and you need to check which one fixes the issue.
Only one of the patch will fix the issue.

{{ patch_str }}

First analyse all the patches thoroughly and then choose the best patch that fixes the issue. You need to
consider all the edge cases very carefully. The chosen patch might be more verbose, but it should pass all the
possible test cases regarding the issue. Choose a patch if you are ABSOLUTELY SURE THAT THE PATCH SOLVES THE ISSUE.

If you feel none of the patches fixes the issue, respond with "RUN AGAIN". Also give a detailed one paragraph of reasoning why you feel
none the patches is a correct solution to the problem. Analyse the runs of the agents as well and provide what the agents did wrong. The reasoning must focus
on the aspects that the agent should take care of in future runs, as well as a summary of the patches generated by the agents.


NOTE: ONLY JUDGE THE PATCHES BASED ON THE CHANGES IN THE SOURCE CODE.
IGNORE THE CHANGES IN THE TESTS, DOCS OR OTHER FILES.
RESPOND WITH THE PATCH NUMBER AND REASONING ONLY IF YOU ARE ABSOLUTELY CONFIDENT THAT THE PATCH FIXED THE ISSUE. RESPOND WITH "RUN AGAIN" OTHERWISE WITH PROPER REASONING.
YOU DON'T NEED TO WORRY ABOUT THE TESTS. ONLY JUDGE THE PATCHES BASED ON THE CHANGES IN SOURCE CODE.

If you are absolutely confident that one of the patches fixes the issue and decide to submit the patch, provide your response in the following format:
{
    "patch": "The number of the patch that best fixes the issue (1, 2, 3, ...)",
    "reasoning": "Your explanation for why the chosen patch fixes the issue",
    "confidence": "How confident are you that the patch fixes the issue? (0-100)"
}

If you feel that none of the patches fixes the issue, decide to reject the patches and run again, provide your response in the format:
{
    "patch": "RUN AGAIN",
    "reasoning": "The detailed reason why none of the patch can fix the issue. Summarise the patches as well, so that next software engineer has the whole context about the
patches and reason of their failures."
}
Please adhere to the json format strictly.
"#;

const COMPARISON_HARD_TEMPLATE: &str = r#"
I am facing the following issue in the repo {{ repo_name }}. You have an older version of the codebase, so your belief about the
codebase might be outdated. Some agents tried to solve the issue and generated patches. Your task is to choose the best patch that fixes the issue.
Issue Description:
{{ issue_desc }}

You are given multiple patches and details of the agent's run, and you need to check which one fixes the issue.
Only one of the patch will fix the issue.

{{ patch_str }}

First analyse all the patches thoroughly and then choose the best patch that fixes the issue. You need to
consider all the edge cases very carefully. The chosen patch might be more verbose, but it should pass all the
possible test cases regarding the issue.

NOTE: ONLY JUDGE THE PATCHES BASED ON THE CHANGES IN THE SOURCE CODE.
IGNORE THE CHANGES IN THE TESTS, DOCS OR OTHER FILES.

Provide your response in the following format:
{
    "patch": "The number of the patch that best fixes the issue (1, 2, 3, ...)",
    "reasoning": "Your explanation for why the chosen patch fixes the issue",
}
"#;

const SUMMARY_TEMPLATE: &str = "The following is the run of the agent after it tried to fix the issue. \
Analyse the contents and messages of the run and give a short summary of what the agent did. \n\
{{ run_content }}. Provide the output in the form of 5-7 chronological points.";

fn render_judge(template: &str, repo_name: &str, issue_desc: &str, patch_str: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("repo_name", repo_name);
    context.insert("issue_desc", issue_desc);
    context.insert("patch_str", patch_str);
    Tera::one_off(template, &context, false)
}

/// Soft judge prompt: pick a patch only when certain, otherwise `RUN AGAIN`
/// with reasoning for the next round.
pub fn build_comparison_prompt(repo_name: &str, issue_desc: &str, patch_str: &str) -> Result<String, tera::Error> {
    render_judge(COMPARISON_TEMPLATE, repo_name, issue_desc, patch_str)
}

/// Hard judge prompt: a patch must be picked.
pub fn build_comparison_prompt_hard(
    repo_name: &str,
    issue_desc: &str,
    patch_str: &str,
) -> Result<String, tera::Error> {
    render_judge(COMPARISON_HARD_TEMPLATE, repo_name, issue_desc, patch_str)
}

pub fn build_summary_prompt(run_content: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("run_content", run_content);
    Tera::one_off(SUMMARY_TEMPLATE, &context, false)
}

/// The message a worker's agent starts from.
///
/// `previous_feedback` is the soft judge's response from the last round;
/// empty on the first round.
pub fn build_issue_prompt(issue_desc: &str, repo_tree: &str, previous_feedback: &str) -> String {
    if previous_feedback.is_empty() {
        format!("{}.\n Output to git tree command {}", issue_desc, repo_tree)
    } else {
        format!(
            "{issue}\n. I have already tried to solve this problem before, but failed for the following reason: \n {feedback}.\n \
             The previous patches did not fix the issue. Now try again to fix the issue. {issue}. \n \
             Output to git tree command {tree}. Pay attention to the reason why patch failed to solve the issue and try something different to fix the issue.",
            issue = issue_desc,
            feedback = previous_feedback,
            tree = repo_tree
        )
    }
}

/// Numbered block of candidate patches, each optionally followed by the
/// summary of the run that produced it.
pub fn build_patch_block<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let separator = "=".repeat(SEPARATOR_WIDTH);
    let mut block = String::new();
    for (i, (patch, summary)) in entries.into_iter().enumerate() {
        block.push_str(&separator);
        block.push_str(&format!("\nPatch {}:\n{}", i + 1, patch));
        if let Some(summary) = summary {
            block.push_str(&format!("\nSummary of the agent:\n{}\n", summary));
        }
    }
    block.push_str(&separator);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_prompt_inserts_values_verbatim() {
        let prompt = build_comparison_prompt(
            "django",
            "QuerySet.none() breaks on <union> & {{ braces }}",
            "PATCH-BLOCK",
        )
        .unwrap();
        assert!(prompt.contains("in the repo django."));
        assert!(prompt.contains("QuerySet.none() breaks on <union> & {{ braces }}"));
        assert!(prompt.contains("PATCH-BLOCK"));
        assert!(prompt.contains("\"confidence\""));
        assert!(prompt.contains("\"patch\": \"RUN AGAIN\""));
    }

    #[test]
    fn test_hard_prompt_has_no_run_again_option() {
        let prompt = build_comparison_prompt_hard("astropy", "issue", "block").unwrap();
        assert!(prompt.contains("in the repo astropy."));
        assert!(!prompt.contains(RUN_AGAIN));
        assert!(!prompt.contains("confidence"));
    }

    #[test]
    fn test_summary_prompt() {
        let prompt = build_summary_prompt("step 1: ran tests").unwrap();
        assert!(prompt.contains("\nstep 1: ran tests. Provide the output"));
        assert!(prompt.ends_with("5-7 chronological points."));
    }

    #[test]
    fn test_issue_prompt_first_round() {
        assert_eq!(
            build_issue_prompt("Fix the bug", "a.py\nb.py", ""),
            "Fix the bug.\n Output to git tree command a.py\nb.py"
        );
    }

    #[test]
    fn test_issue_prompt_with_feedback() {
        let prompt = build_issue_prompt("Fix the bug", "a.py", "RUN AGAIN: patch 1 misses None");
        assert!(prompt.starts_with("Fix the bug\n. I have already tried"));
        assert!(prompt.contains("RUN AGAIN: patch 1 misses None"));
        assert_eq!(prompt.matches("Fix the bug").count(), 2);
        assert!(prompt.contains("try something different"));
    }

    #[test]
    fn test_patch_block_with_summaries() {
        let sep = "=".repeat(50);
        let block = build_patch_block(vec![("diff a", Some("did a")), ("diff b", Some("did b"))]);
        assert_eq!(
            block,
            format!(
                "{sep}\nPatch 1:\ndiff a\nSummary of the agent:\ndid a\n{sep}\nPatch 2:\ndiff b\nSummary of the agent:\ndid b\n{sep}"
            )
        );
    }

    #[test]
    fn test_patch_block_without_summaries() {
        let sep = "=".repeat(50);
        let block = build_patch_block(vec![("diff a", None::<&str>)]);
        assert_eq!(block, format!("{sep}\nPatch 1:\ndiff a{sep}"));
        assert_eq!(build_patch_block(Vec::<(&str, Option<&str>)>::new()), sep);
    }
}
