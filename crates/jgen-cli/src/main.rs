use std::{
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use clap::Parser;
use jgen::{emit, CasePolicy, CompileOptions, GrammarDocument, Program};

#[derive(Parser)]
#[command(name = "jgen", version)]
#[command(about = "Compile a JSON grammar into a backtracking Rust parser")]
struct Cli {
    /// JSON grammar file
    grammar: PathBuf,

    /// Rule the generated parser starts from
    #[arg(short, long, value_name = "RULE", default_value = CompileOptions::DEFAULT_START)]
    start: String,

    /// Write the generated code to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// What a (case) does when no label matches: fail or panic
    #[arg(long, value_name = "POLICY")]
    unmatched_case: Option<CasePolicy>,

    /// Format the generated code with rustfmt
    #[arg(long)]
    rustfmt: bool,

    /// Print the resolved rules to stderr
    #[arg(long)]
    tree: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logger() {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logger() -> anyhow::Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level)
        .with_context(|| format!("Invalid RUST_LOG level `{level}`"))?;

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )?;
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = &cli.grammar;
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grammar `{}`", path.display()))?;

    let options = CompileOptions {
        start: cli.start.clone(),
        unmatched_case: cli.unmatched_case,
        source_name: Some(file_name(path)),
    };

    let document = GrammarDocument::from_str(&src)
        .with_context(|| format!("Failed to load grammar `{}`", path.display()))?;
    log::info!("Loaded {} rules from `{}`", document.len(), path.display());

    let program = Program::compile(&document, &options)
        .with_context(|| format!("Failed to compile `{}`", path.display()))?;

    if cli.tree {
        let mut tree = String::new();
        program.display_rules(&mut tree)?;
        eprint!("{tree}");
    }

    let mut code = emit::emit(&program, &options);
    if cli.rustfmt {
        match rustfmt_format(&code) {
            Ok(formatted) => code = formatted,
            Err(e) => log::warn!("rustfmt failed, writing unformatted code\n  {e}"),
        }
    }

    match &cli.output {
        Some(output) => std::fs::write(output, code)
            .with_context(|| format!("Failed to write `{}`", output.display()))?,
        None => std::io::stdout()
            .lock()
            .write_all(code.as_bytes())
            .context("Failed to write to stdout")?,
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

fn rustfmt_format(input: &str) -> anyhow::Result<String> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("rustfmt")
        .args(["--edition", "2021"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn rustfmt")?;

    {
        let mut stdin = child.stdin.take().context("Failed to open rustfmt stdin")?;
        stdin
            .write_all(input.as_bytes())
            .context("Failed to write to rustfmt stdin")?;
    }

    let output = child
        .wait_with_output()
        .context("Failed to read rustfmt output")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("rustfmt exited with {}\n{stderr}", output.status);
    }

    String::from_utf8(output.stdout).context("rustfmt returned non-utf8 data")
}

#[test]
fn test_cli_definition() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn test_cli_arguments() {
    let cli = Cli::parse_from(["jgen", "grammar.json", "--unmatched-case", "panic", "-s", "top"]);
    assert_eq!(cli.grammar, PathBuf::from("grammar.json"));
    assert_eq!(cli.start, "top");
    assert_eq!(cli.unmatched_case, Some(CasePolicy::Panic));
    assert!(!cli.rustfmt);

    let cli = Cli::parse_from(["jgen", "grammar.json"]);
    assert_eq!(cli.start, "l-yaml-stream");
    assert_eq!(cli.unmatched_case, None);
    assert!(Cli::try_parse_from(["jgen", "g.json", "--unmatched-case", "skip"]).is_err());
}
