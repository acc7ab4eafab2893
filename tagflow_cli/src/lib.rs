use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render tagflow templates and evaluate tagflow expressions.",
	long_about = "tagflow is a small template language built from directives such as `IF .. THEN .. \
	              END`, `REPEAT .. TIMES .. END` and `FOR EACH .. IN .. END`, with an expression \
	              language inside every tag.\n\nQuick start:\n  tagflow render page.tf    Render a \
	              template to stdout\n  tagflow check page.tf     Parse a template without \
	              rendering it\n  tagflow eval \"1 + 2 * 3\"  Evaluate a single expression"
)]
pub struct TagflowCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory, where `tagflow.toml` is looked
	/// up.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Render a template file and print the output.
	///
	/// Variables come from the `[variables]` and `[data]` tables of
	/// `tagflow.toml`, then from `--data`, which wins on conflicts.
	Render {
		/// The template file to render.
		file: PathBuf,

		/// A JSON object whose entries are added as variables.
		#[arg(long)]
		data: Option<String>,

		/// Fail on evaluation errors such as division by zero instead of
		/// rendering them as empty text.
		#[arg(long, default_value_t = false)]
		strict: bool,
	},
	/// Parse a template file without rendering it.
	///
	/// Reports how many directive occurrences the template contains. Exits
	/// with a non-zero status code when the template does not parse.
	Check {
		/// The template file to check.
		file: PathBuf,
	},
	/// Evaluate a single expression.
	///
	/// Prints the structural form of the expression, with constant parts
	/// folded, followed by its value.
	Eval {
		/// The expression to evaluate.
		expression: String,
	},
}
