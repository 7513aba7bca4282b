use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render templates whose `{name}` placeholders and bare variable names stay in sync with \
	         a set of variables.",
	long_about = "composed resolves templates against variables loaded from `composed.toml`, the \
	              variable files it lists, and `--set` overrides.\n\nBracketed references \
	              (`{name}`) are always substituted and resolve to nothing when the variable is \
	              missing. Bare words are substituted only when a variable with that exact name \
	              exists.\n\nQuick start:\n  composed init               Create a sample \
	              composed.toml\n  composed render \"{name}\"     Print a resolved template\n  \
	              composed vars \"{name} fuel\"  List the variables a template uses"
)]
pub struct ComposedCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Set a variable, overriding any value from the config. Repeatable.
	/// `true` and `false` become booleans and numbers become numbers.
	#[arg(long = "set", short = 's', global = true, value_name = "NAME=VALUE")]
	pub set: Vec<String>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create a sample `composed.toml` in the project root.
	///
	/// If a config file already exists this command leaves it untouched and
	/// exits successfully.
	Init,
	/// Print a template with every variable reference resolved.
	///
	/// With `--watch`, the config and its variable files are watched and the
	/// template is printed again whenever a change alters its output.
	Render {
		#[command(flatten)]
		input: TemplateInput,

		/// Watch the project for changes and print the template again
		/// whenever its output changes.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// List the variables a template uses together with the segment they
	/// resolve from and their current text.
	Vars {
		#[command(flatten)]
		input: TemplateInput,

		/// Output format. Use `text` for a human-readable table or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
}

/// Where the template comes from: inline or from a file.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TemplateInput {
	/// The template text, e.g. `"{craft} at altitude km"`.
	pub template: Option<String>,

	/// Read the template from a file instead. Trailing line breaks are
	/// ignored.
	#[arg(long, short)]
	pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
