use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tagflow_cli::Commands;
use tagflow_cli::TagflowCli;
use tagflow_core::AnyEmptyResult;
use tagflow_core::Dialect;
use tagflow_core::DocumentNode;
use tagflow_core::RenderContext;
use tagflow_core::TagflowConfig;
use tagflow_core::TagflowError;
use tagflow_core::TagflowResult;
use tagflow_core::Value;
use tracing_subscriber::EnvFilter;

fn main() {
	let args = TagflowCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	if args.verbose || std::env::var_os("RUST_LOG").is_some() {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tagflow_core=debug"));
		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.with_ansi(use_color)
			.init();
	}

	let result = match &args.command {
		Some(Commands::Render { file, data, strict }) => run_render(&args, file, data.as_deref(), *strict),
		Some(Commands::Check { file }) => run_check(&args, file),
		Some(Commands::Eval { expression }) => run_eval(&args, expression),
		None => {
			eprintln!("No subcommand specified. Run `tagflow --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<TagflowError>() {
			Ok(tagflow_err) => {
				let report: miette::Report = (*tagflow_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("error: {e}");
			}
		}
		process::exit(2);
	}
}

fn resolve_root(args: &TagflowCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// The dialect and render context for the project at `root`, falling back
/// to the standard dialect and an empty context without a config file.
fn load_project(args: &TagflowCli) -> TagflowResult<(Dialect, RenderContext)> {
	let root = resolve_root(args);

	let Some(config) = TagflowConfig::load(&root)? else {
		return Ok((Dialect::try_standard()?, RenderContext::new()));
	};

	if args.verbose {
		if let Some(path) = TagflowConfig::resolve_path(&root) {
			eprintln!("Using config: {}", path.display());
		}
	}

	Ok((config.dialect()?, config.context(&root)?))
}

fn read_template(file: &Path) -> TagflowResult<String> {
	std::fs::read_to_string(file).map_err(|e| {
		TagflowError::DataFile {
			path: file.display().to_string(),
			reason: e.to_string(),
		}
	})
}

/// Parse `--data` as a JSON object of variables.
fn parse_data(data: &str) -> TagflowResult<Vec<(String, Value)>> {
	let data_error = |reason: String| {
		TagflowError::DataFile {
			path: "--data".to_string(),
			reason,
		}
	};

	let json: serde_json::Value = serde_json::from_str(data).map_err(|e| data_error(e.to_string()))?;
	let serde_json::Value::Object(entries) = json else {
		return Err(data_error(format!("expected a JSON object, found {json}")));
	};

	Ok(entries
		.into_iter()
		.map(|(name, value)| (name, Value::from(value)))
		.collect())
}

fn run_render(args: &TagflowCli, file: &Path, data: Option<&str>, strict: bool) -> AnyEmptyResult {
	let (dialect, mut context) = load_project(args)?;

	if let Some(data) = data {
		context.extend(parse_data(data)?);
	}

	if strict {
		context = context.with_strict(true);
	}

	let source = read_template(file)?;
	let output = dialect.parse(&source)?.render(&mut context)?;
	print!("{output}");

	Ok(())
}

fn run_check(args: &TagflowCli, file: &Path) -> AnyEmptyResult {
	let (dialect, _) = load_project(args)?;
	let source = read_template(file)?;
	let template = dialect.parse(&source)?;
	let count = count_directives(template.nodes());

	let noun = if count == 1 { "directive" } else { "directives" };
	println!("{} parsed: {count} {noun}", file.display());

	Ok(())
}

fn run_eval(args: &TagflowCli, source: &str) -> AnyEmptyResult {
	let (dialect, mut context) = load_project(args)?;
	let expression = dialect.parse_expression(source)?;
	let value = expression.evaluate(&mut context)?;

	println!("{expression}");

	if value.is_undefined() {
		println!("= undefined");
	} else {
		println!("= {value}");
	}

	Ok(())
}

fn count_directives(nodes: &[DocumentNode]) -> usize {
	nodes
		.iter()
		.map(|node| {
			match node {
				DocumentNode::Text(_) => 0,
				DocumentNode::Directive(directive) => {
					1 + directive
						.bodies
						.iter()
						.map(|body| count_directives(body))
						.sum::<usize>()
				}
			}
		})
		.sum()
}
