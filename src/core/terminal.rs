use console::{Emoji, style};

pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "       _                   _           _    ",
        "  ___ | | __ ___      __ _| | ___  ___| | __",
        " / __|| |/ _` \\ \\ /\\ / / _` |/ _ \\/ __| |/ /",
        "| (__ | | (_| |\\ V  V / (_| |  __/ (__|   < ",
        " \\___||_|\\__,_| \\_/\\_/ \\__,_|\\___|\\___|_|\\_\\",
    ];
    println!();
    for line in lines {
        println!("{}", style(line).cyan().bold());
    }
    println!(
        " {}\n",
        style("OpenClaw fleet command center").dim().italic()
    );
}

/// Aligned key/value help and status blocks for CLI output.
pub struct GuideSection {
    title: String,
    rows: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows.push(format!(
            "  {:<14} {}",
            style(name).green().bold(),
            description
        ));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.rows
            .push(format!("  {:<14} {}", style(label).bold().cyan(), value));
        self
    }

    pub fn print(self) {
        println!(" {}", style(self.title).bold().underlined());
        for row in self.rows {
            println!("{}", row);
        }
        println!();
    }
}
