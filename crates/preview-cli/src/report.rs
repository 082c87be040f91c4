use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use preview_core::ServiceEntry;
use preview_sync::DeployOutcome;

use crate::config::Settings;
use crate::diff::{has_changes, line_diff};
use crate::render::{
    render_diff_line, render_section_header, render_status_line, OutputStyle, WorkflowCommands,
};

const SHORT_VERSION_LEN: usize = 7;

pub(crate) fn print_deploy_narrative(
    outcome: &DeployOutcome,
    settings: &Settings,
    style: OutputStyle,
    workflow: WorkflowCommands,
) {
    for line in format_deploy_narrative(outcome, settings, style, workflow) {
        println!("{line}");
    }
}

pub(crate) fn format_deploy_narrative(
    outcome: &DeployOutcome,
    settings: &Settings,
    style: OutputStyle,
    workflow: WorkflowCommands,
) -> Vec<String> {
    let request = &settings.request;
    let mut lines = vec![format!(
        "Branch: {} -> Slug: {}",
        request.branch, outcome.slug
    )];

    match &outcome.previous {
        Some(previous) => {
            push_block(&mut lines, style, workflow, "Current record", previous);
            push_block(&mut lines, style, workflow, "Updated record", &outcome.content);

            let diff = line_diff(previous, &outcome.content);
            lines.extend(workflow.group("Diff"));
            lines.push(render_section_header(style, "Diff"));
            if has_changes(&diff) {
                lines.extend(diff.iter().map(|line| render_diff_line(style, line)));
            } else {
                lines.push("(no changes)".to_string());
            }
            lines.extend(workflow.endgroup());
        }
        None => {
            lines.push(format!("No existing preview for slug: {}", outcome.slug));
            push_block(&mut lines, style, workflow, "Generated record", &outcome.content);
        }
    }

    let verb = if outcome.created { "created" } else { "updated" };
    lines.push(render_status_line(
        style,
        "ok",
        &format!(
            "{verb} {} after {} of {} attempt(s)",
            outcome.path,
            outcome.attempts,
            settings.deploy.max_attempts
        ),
    ));

    let commit_line = match &outcome.commit.html_url {
        Some(url) => format!("Commit: {url}"),
        None => format!("Commit: {}", outcome.commit.sha),
    };
    lines.extend(workflow.notice(&commit_line));
    if !workflow.enabled() {
        lines.push(commit_line);
    }
    lines
}

fn push_block(
    lines: &mut Vec<String>,
    style: OutputStyle,
    workflow: WorkflowCommands,
    title: &str,
    content: &str,
) {
    lines.extend(workflow.group(title));
    lines.push(render_section_header(style, title));
    lines.extend(content.lines().map(str::to_string));
    lines.extend(workflow.endgroup());
}

pub(crate) fn summary_markdown(outcome: &DeployOutcome, settings: &Settings) -> String {
    let request = &settings.request;
    let mut out = String::new();
    out.push_str(&format!("## Preview `{}`\n\n", outcome.slug));
    out.push_str(&format!(
        "Deployed **{}** from branch `{}`.\n\n",
        request.service, request.branch
    ));
    out.push_str("| Service | Version |\n|---|---|\n");
    for entry in &outcome.record.services {
        let name = if entry.name == request.service {
            format!("**{}**", entry.name)
        } else {
            entry.name.clone()
        };
        out.push_str(&format!("| {name} | {} |\n", version_cell(entry)));
    }

    let pr_link = outcome
        .record
        .entry(&request.service)
        .and_then(|entry| entry.metadata.as_ref())
        .and_then(|metadata| {
            let url = metadata.pr_url.as_deref()?;
            Some(match metadata.pr_number {
                Some(number) => format!("[#{number}]({url})"),
                None => format!("[pull request]({url})"),
            })
        });
    out.push('\n');
    if let Some(link) = pr_link {
        out.push_str(&format!("Pull request: {link}\n\n"));
    }
    match &outcome.commit.html_url {
        Some(url) => out.push_str(&format!("Commit: [{}]({url})\n", short(&outcome.commit.sha))),
        None => out.push_str(&format!("Commit: `{}`\n", outcome.commit.sha)),
    }
    out
}

fn version_cell(entry: &ServiceEntry) -> String {
    match entry.version.as_deref() {
        Some(version) => format!("pinned to `{}`", short(version)),
        None => "tracking default".to_string(),
    }
}

fn short(version: &str) -> &str {
    version
        .char_indices()
        .nth(SHORT_VERSION_LEN)
        .map_or(version, |(end, _)| &version[..end])
}

pub(crate) fn write_step_summary(markdown: &str) -> Result<()> {
    match std::env::var_os("GITHUB_STEP_SUMMARY") {
        Some(path) if !path.is_empty() => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| {
                    format!(
                        "failed opening step summary file: {}",
                        path.to_string_lossy()
                    )
                })?;
            writeln!(file, "{markdown}").context("failed writing step summary")?;
        }
        _ => {
            println!("--- SUMMARY ---");
            println!("{markdown}");
            println!("--- END SUMMARY ---");
        }
    }
    Ok(())
}

pub(crate) fn print_failure(err: &anyhow::Error, style: OutputStyle, workflow: WorkflowCommands) {
    let message = format!("{err:#}");
    // Workflow commands are only picked up from stdout.
    if let Some(command) = workflow.error(&message) {
        println!("{command}");
    }
    eprintln!("{}", format_failure(&message, style));
}

pub(crate) fn format_failure(message: &str, style: OutputStyle) -> String {
    render_status_line(style, "error", &format!("error: {message}"))
}
