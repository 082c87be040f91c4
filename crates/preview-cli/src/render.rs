use anstyle::{AnsiColor, Effects, Style};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "error" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> String {
    match style {
        OutputStyle::Plain => title.to_string(),
        OutputStyle::Rich => colorize(section_style(), &format!("== {title} ==")),
    }
}

pub(crate) fn render_diff_line(style: OutputStyle, line: &str) -> String {
    if style == OutputStyle::Plain {
        return line.to_string();
    }
    if line.starts_with("+ ") {
        colorize(Style::new().fg_color(Some(AnsiColor::Green.into())), line)
    } else if line.starts_with("- ") {
        colorize(Style::new().fg_color(Some(AnsiColor::Red.into())), line)
    } else {
        line.to_string()
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct WorkflowCommands {
    enabled: bool,
}

impl WorkflowCommands {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub(crate) fn from_env() -> Self {
        Self::new(std::env::var("GITHUB_ACTIONS").is_ok_and(|value| value == "true"))
    }

    pub(crate) fn enabled(self) -> bool {
        self.enabled
    }

    pub(crate) fn group(self, title: &str) -> Option<String> {
        self.command("group", &escape_workflow_data(title))
    }

    pub(crate) fn endgroup(self) -> Option<String> {
        self.command("endgroup", "")
    }

    pub(crate) fn error(self, message: &str) -> Option<String> {
        self.command("error", &escape_workflow_data(message))
    }

    pub(crate) fn notice(self, message: &str) -> Option<String> {
        self.command("notice", &escape_workflow_data(message))
    }

    fn command(self, name: &str, data: &str) -> Option<String> {
        self.enabled.then(|| format!("::{name}::{data}"))
    }
}

pub(crate) fn escape_workflow_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
