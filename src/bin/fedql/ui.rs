use std::io::IsTerminal;

use fedql::{CommandOutput, ResultRows};
use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

pub struct Ui {
    palette: Palette,
    paint: bool,
    interactive: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let stdout_is_tty = std::io::stdout().is_terminal();
        let paint = match theme {
            Theme::Plain => false,
            Theme::Auto | Theme::Light | Theme::Dark => stdout_is_tty,
        };

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = match theme {
            Theme::Plain => Palette::plain(),
            Theme::Light => Palette::light(),
            Theme::Dark | Theme::Auto => Palette::dark(),
        };
        Self {
            palette,
            paint,
            interactive: std::io::stdin().is_terminal(),
        }
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn prompt(&self) {
        if !self.interactive {
            return;
        }
        let prompt = if self.paint {
            self.palette.prompt.paint(PROMPT).to_string()
        } else {
            PROMPT.to_string()
        };
        eprint!("{prompt}");
    }

    /// Prints command output; interactive sessions get a header line and a
    /// row count around result rows.
    pub fn output(&self, output: &CommandOutput) {
        match output {
            CommandOutput::Rows(rows) if self.interactive => self.rows(rows),
            other => {
                let text = other.to_string();
                if !text.is_empty() {
                    println!("{text}");
                }
            }
        }
    }

    fn rows(&self, rows: &ResultRows) {
        if !rows.is_empty() {
            let header = rows.columns().join("|");
            if self.paint {
                println!("{}", self.palette.heading.paint(header));
            } else {
                println!("{header}");
            }
            println!("{rows}");
        }
        let count = format!("({} row{})", rows.len(), if rows.len() == 1 { "" } else { "s" });
        if self.paint {
            eprintln!("{}", self.palette.muted.paint(count));
        } else {
            eprintln!("{count}");
        }
    }

    pub fn error(&self, code: &str, message: &str) {
        if self.paint {
            eprintln!(
                "{} {message}",
                self.palette.error.paint(format!("{ERROR_ICON} [{code}]"))
            );
        } else {
            eprintln!("{ERROR_ICON} [{code}] {message}");
        }
    }
}

struct Palette {
    heading: Style,
    prompt: Style,
    muted: Style,
    error: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::LightBlue).bold(),
            prompt: Style::new().fg(Color::Purple).bold(),
            muted: Style::new().fg(Color::DarkGray),
            error: Style::new().fg(Color::LightRed).bold(),
        }
    }

    fn light() -> Self {
        Self {
            heading: Style::new().fg(Color::Blue).bold(),
            prompt: Style::new().fg(Color::Blue).bold(),
            muted: Style::new().fg(Color::DarkGray),
            error: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            prompt: Style::new(),
            muted: Style::new(),
            error: Style::new(),
        }
    }
}

const PROMPT: &str = "fedql> ";
const ERROR_ICON: &str = "✖";
