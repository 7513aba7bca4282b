use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use composed_cli::Commands;
use composed_cli::ComposedCli;
use composed_cli::OutputFormat;
use composed_cli::TemplateInput;
use composed_core::AnyEmptyResult;
use composed_core::AnyResult;
use composed_core::CONFIG_FILE_CANDIDATES;
use composed_core::ComposedConfig;
use composed_core::ComposedString;
use composed_core::VariableRegistry;
use composed_core::VariableSet;
use composed_core::VariableStore;
use composed_core::normalize_path;
use composed_core::parse_assignment;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,dimmed) => {
		if color_enabled() {
			format!("{}", $text.dimmed())
		} else {
			format!("{}", $text)
		}
	};
}

const SAMPLE_CONFIG: &str = "# composed configuration\n\n# Inline variables. Strings, numbers and \
                             booleans are stored in their own segment.\n[variables]\ncraft = \
                             \"Falcon\"\nstage = 2\narmed = true\n\n# Variable files, applied in \
                             order. Inline variables override them.\n# Nested tables become \
                             dotted names such as {release.version}.\n# [[sources]]\n# path = \
                             \"vars.json\"\n#\n# [[sources]]\n# path = \"release.toml\"\n# \
                             namespace = \"release\"\n";

fn main() {
	let args = ComposedCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose);

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

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Render { input, watch }) => run_render(&args, input, *watch),
		Some(Commands::Vars { input, format }) => run_vars(&args, input, *format),
		None => {
			eprintln!("No subcommand specified. Run `composed --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Render core errors through miette for help text and error codes.
		match e.downcast::<composed_core::ComposedError>() {
			Ok(composed_err) => {
				let report: miette::Report = (*composed_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr, filtered by `RUST_LOG` when set.
fn init_tracing(verbose: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.try_init()
		.ok();
}

fn resolve_root(args: &ComposedCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Variables from the config and its sources, with `--set` overrides on top.
fn load_variables(args: &ComposedCli, root: &Path) -> AnyResult<VariableSet> {
	let mut variables = match ComposedConfig::load(root)? {
		Some(config) => config.load_variables(root)?,
		None => {
			tracing::debug!(root = %root.display(), "no config file found");
			VariableSet::new()
		}
	};

	for raw in &args.set {
		let assignment = parse_assignment(raw)?;
		variables.insert(assignment.name, assignment.value);
	}

	Ok(variables)
}

fn read_template(input: &TemplateInput) -> AnyResult<String> {
	if let Some(template) = &input.template {
		return Ok(template.clone());
	}

	let Some(file) = &input.file else {
		return Err("a template or `--file` is required".into());
	};

	let content = std::fs::read_to_string(file)
		.map_err(|e| format!("failed to read template `{}`: {e}", file.display()))?;
	Ok(content.trim_end_matches(['\n', '\r']).to_string())
}

fn run_init(args: &ComposedCli) -> AnyEmptyResult {
	let root = resolve_root(args);

	if let Some(existing) = ComposedConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(());
	}

	let config_path = root.join(CONFIG_FILE_CANDIDATES[0]);
	std::fs::write(&config_path, SAMPLE_CONFIG)?;
	println!("Created {}", config_path.display());

	println!();
	println!("Next steps:");
	println!("  1. Edit composed.toml to define your variables");
	println!("  2. Render a template:");
	println!("     composed render \"{{craft}} ready: armed\"");
	println!("  3. Add `--watch` to re-render whenever a variable changes");

	Ok(())
}

fn run_render(args: &ComposedCli, input: &TemplateInput, watch: bool) -> AnyEmptyResult {
	let root = resolve_root(args);
	let store = VariableStore::new();
	store.extend(&load_variables(args, &root)?);

	let value = ComposedString::new(read_template(input)?, store.shared());
	let mut last_printed = value.get_value();
	println!("{last_printed}");

	if !watch {
		return Ok(());
	}

	eprintln!(
		"{}",
		colored!("Watching for changes... (press Ctrl+C to stop)", dimmed)
	);

	let (tx, rx) = mpsc::channel();

	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				if matches!(
					event.kind,
					notify::EventKind::Modify(_)
						| notify::EventKind::Create(_)
						| notify::EventKind::Remove(_)
				) {
					let _ = tx.send(());
				}
			}
		})?;

	use notify::Watcher;
	let root = std::fs::canonicalize(&root).unwrap_or(root);
	watcher.watch(&root, notify::RecursiveMode::Recursive)?;

	// Sources and template files outside the root need their own watch.
	let mut watched = BTreeSet::new();
	watch_external_dirs(&mut watcher, &mut watched, external_dirs(&root, input));

	// A reload can touch several variables; print once it has settled.
	let dirty = Rc::new(Cell::new(false));
	let flag = Rc::clone(&dirty);
	let _listener = value.on_change(move |_: &String| flag.set(true));

	loop {
		rx.recv()?;
		// Debounce: drain additional events within 200ms.
		while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

		match load_variables(args, &root) {
			Ok(variables) => {
				let changed = store.sync(&variables);
				tracing::debug!(changed, "reloaded variables");
			}
			Err(e) => eprintln!("{} {e}", colored!("error:", red)),
		}

		if input.file.is_some() {
			match read_template(input) {
				Ok(template) => value.set_input(template),
				Err(e) => eprintln!("{} {e}", colored!("error:", red)),
			}
		}

		// Bare words defined by this reload are not subscribed to yet.
		if value.refresh_if_stale() {
			dirty.set(true);
		}

		watch_external_dirs(&mut watcher, &mut watched, external_dirs(&root, input));

		if dirty.replace(false) {
			let output = value.get_value();
			if output != last_printed {
				println!("{output}");
				last_printed = output;
			}
		}
	}
}

/// Parent directories of the template file and of every variable source that
/// sit outside `root`. Directories are watched rather than files so that
/// editors replacing a file on save are still noticed.
fn external_dirs(root: &Path, input: &TemplateInput) -> BTreeSet<PathBuf> {
	let mut files = match ComposedConfig::load(root) {
		Ok(Some(config)) => config.external_source_paths(root),
		Ok(None) => Vec::new(),
		Err(e) => {
			tracing::debug!(error = %e, "cannot list variable sources to watch");
			Vec::new()
		}
	};

	if let Some(file) = &input.file {
		let file = std::fs::canonicalize(file).unwrap_or_else(|_| normalize_path(file));
		if !file.starts_with(root) {
			files.push(file);
		}
	}

	files
		.iter()
		.filter_map(|file| file.parent())
		.filter(|dir| !dir.as_os_str().is_empty())
		.map(Path::to_path_buf)
		.collect()
}

fn watch_external_dirs(
	watcher: &mut impl notify::Watcher,
	watched: &mut BTreeSet<PathBuf>,
	dirs: BTreeSet<PathBuf>,
) {
	for dir in dirs {
		if watched.contains(&dir) {
			continue;
		}

		match watcher.watch(&dir, notify::RecursiveMode::NonRecursive) {
			Ok(()) => {
				tracing::debug!(dir = %dir.display(), "watching external directory");
				watched.insert(dir);
			}
			Err(e) => {
				eprintln!(
					"{} cannot watch {}: {e}",
					colored!("warning:", yellow),
					dir.display()
				);
			}
		}
	}
}

fn run_vars(args: &ComposedCli, input: &TemplateInput, format: OutputFormat) -> AnyEmptyResult {
	let root = resolve_root(args);
	let store = VariableStore::new();
	store.extend(&load_variables(args, &root)?);

	let template = read_template(input)?;
	let value = ComposedString::new(template.clone(), store.shared());
	let rows: Vec<(String, Option<composed_core::Resolved>)> = value
		.used_variables()
		.into_iter()
		.map(|name| {
			let resolved = store.resolve(&name);
			(name, resolved)
		})
		.collect();

	match format {
		OutputFormat::Json => {
			let variables: Vec<serde_json::Value> = rows
				.iter()
				.map(|(name, resolved)| {
					serde_json::json!({
						"name": name,
						"segment": resolved.as_ref().map(|r| r.segment.as_str()),
						"value": resolved.as_ref().map(composed_core::Resolved::to_text),
					})
				})
				.collect();
			let output = serde_json::json!({
				"template": template,
				"value": value.get_value(),
				"variables": variables,
			});
			println!("{output}");
		}
		OutputFormat::Text => {
			if rows.is_empty() {
				println!("No variables referenced.");
				return Ok(());
			}

			for (name, resolved) in &rows {
				let label = colored!(format!("{name:<24}"), bold);
				match resolved {
					Some(resolved) => {
						println!("{label} {:<8} {}", resolved.segment.as_str(), resolved.to_text());
					}
					None => println!("{label} {}", colored!("undefined", yellow)),
				}
			}
		}
	}

	Ok(())
}
