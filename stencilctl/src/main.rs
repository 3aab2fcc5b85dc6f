//! Stencilctl renders component manifests from the command line.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context as _, bail};
use serde_json::Value as Json;
use tracing::{debug, info};
use validator::Validate;

use api::v1alpha1::{Addon, AdditionalContext, Component, ComponentDefinition, EnvironmentSettings};
use stencil_render::Renderer;

fn main() {
    use clap::{Arg, ArgAction, Command, ValueHint, crate_name, crate_version};
    use std::process;

    let file_args = || {
        [
            Arg::new("definition")
                .long("definition")
                .short('d')
                .help("component definition file (YAML or JSON)")
                .value_hint(ValueHint::FilePath)
                .required(true),
            Arg::new("addon")
                .long("addon")
                .short('a')
                .help("addon file; repeat for several")
                .value_hint(ValueHint::FilePath)
                .action(ArgAction::Append),
        ]
    };
    let cmd = Command::new(crate_name!())
        .version(crate_version!())
        .about("render workload manifests from component definitions")
        .subcommand_required(true)
        .subcommands([
            Command::new("render")
                .about("render a component into its resource documents")
                .args(file_args())
                .args([
                    Arg::new("component")
                        .long("component")
                        .short('c')
                        .help("component file")
                        .value_hint(ValueHint::FilePath)
                        .required(true),
                    Arg::new("env_settings")
                        .long("env-settings")
                        .help("environment settings file")
                        .value_hint(ValueHint::FilePath),
                    Arg::new("context")
                        .long("context")
                        .help("platform context file")
                        .value_hint(ValueHint::FilePath),
                    Arg::new("workload")
                        .long("workload")
                        .help("workload document file")
                        .value_hint(ValueHint::FilePath),
                    Arg::new("addon_limit")
                        .long("addon-limit")
                        .help("apply only the first N addon instances")
                        .value_parser(clap::value_parser!(usize)),
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("output encoding")
                        .value_parser(["yaml", "json"])
                        .default_value("yaml"),
                ]),
            Command::new("schema")
                .about("translate a schema into its JSON Schema document")
                .args(file_args())
                .args([
                    Arg::new("overrides")
                        .long("overrides")
                        .help("translate the envOverrides schema instead of parameters")
                        .action(ArgAction::SetTrue),
                    Arg::new("out")
                        .long("out")
                        .help("write to a file instead of stdout")
                        .value_hint(ValueHint::FilePath),
                ]),
        ]);

    setup_tracing();
    if let Err(e) = match cmd.get_matches().subcommand() {
        Some(("render", m)) => render(RenderArgs::from(m)),
        Some(("schema", m)) => schema(SchemaArgs::from(m)),
        _ => unreachable!(),
    } {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn setup_tracing() {
    use tracing_subscriber::{filter::EnvFilter, prelude::*};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let collector = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(if std::io::stderr().is_terminal() {
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        } else {
            None
        })
        .with(if std::io::stderr().is_terminal() {
            None
        } else {
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
        });
    // Nothing to do if a collector is already installed.
    let _ = tracing::subscriber::set_global_default(collector);
}

struct RenderArgs {
    definition: PathBuf,
    component: PathBuf,
    env_settings: Option<PathBuf>,
    addons: Vec<PathBuf>,
    context: Option<PathBuf>,
    workload: Option<PathBuf>,
    addon_limit: Option<usize>,
    output: String,
}

impl From<&clap::ArgMatches> for RenderArgs {
    fn from(m: &clap::ArgMatches) -> Self {
        Self {
            definition: m.get_one::<String>("definition").unwrap().into(),
            component: m.get_one::<String>("component").unwrap().into(),
            env_settings: m.get_one::<String>("env_settings").map(Into::into),
            addons: m
                .get_many::<String>("addon")
                .unwrap_or_default()
                .map(Into::into)
                .collect(),
            context: m.get_one::<String>("context").map(Into::into),
            workload: m.get_one::<String>("workload").map(Into::into),
            addon_limit: m.get_one::<usize>("addon_limit").copied(),
            output: m.get_one::<String>("output").unwrap().clone(),
        }
    }
}

struct SchemaArgs {
    definition: PathBuf,
    addons: Vec<PathBuf>,
    overrides: bool,
    out: Option<PathBuf>,
}

impl From<&clap::ArgMatches> for SchemaArgs {
    fn from(m: &clap::ArgMatches) -> Self {
        Self {
            definition: m.get_one::<String>("definition").unwrap().into(),
            addons: m
                .get_many::<String>("addon")
                .unwrap_or_default()
                .map(Into::into)
                .collect(),
            overrides: m.get_flag("overrides"),
            out: m.get_one::<String>("out").map(Into::into),
        }
    }
}

fn render(args: RenderArgs) -> anyhow::Result<()> {
    let definition: ComponentDefinition = load(&args.definition)?;
    definition
        .validate()
        .with_context(|| format!("invalid definition {}", args.definition.display()))?;
    let component: Component = load(&args.component)?;
    component
        .validate()
        .with_context(|| format!("invalid component {}", args.component.display()))?;
    if component.spec.component_type != definition.metadata.name {
        bail!(
            "component wants type {:?} but the definition is {:?}",
            component.spec.component_type,
            definition.metadata.name,
        );
    }

    let env_settings: Option<EnvironmentSettings> =
        args.env_settings.as_deref().map(load).transpose()?;
    let context: Option<AdditionalContext> = args.context.as_deref().map(load).transpose()?;
    let workload: Option<Json> = args.workload.as_deref().map(load).transpose()?;
    let addons: Vec<Addon> = args
        .addons
        .iter()
        .map(|p| load(p))
        .collect::<anyhow::Result<_>>()?;
    info!(
        definition = %definition.metadata.name,
        component = %component.metadata.name,
        addons = addons.len(),
        "inputs loaded",
    );

    let mut renderer = Renderer::new(&definition, &component).with_addons(&addons);
    if let Some(es) = &env_settings {
        renderer = renderer.with_env_settings(es);
    }
    if let Some(ctx) = &context {
        renderer = renderer.with_context(ctx);
    }
    if let Some(wl) = &workload {
        renderer = renderer.with_workload(wl);
    }

    let resources = match args.addon_limit {
        Some(limit) => renderer.render_with_addon_limit(limit),
        None => renderer.render_all(),
    }?;
    debug!(count = resources.len(), "rendered");

    let mut out = String::new();
    match args.output.as_str() {
        "json" => out = serde_json::to_string_pretty(&resources)?,
        _ => {
            for resource in &resources {
                out.push_str("---\n");
                out.push_str(&serde_yaml::to_string(resource)?);
            }
        }
    }
    println!("{out}");
    Ok(())
}

fn schema(args: SchemaArgs) -> anyhow::Result<()> {
    let mut documents = Vec::new();

    let definition: ComponentDefinition = load(&args.definition)?;
    let translated = if args.overrides {
        stencil_schema::translate_overrides(&definition.spec.schema)?
    } else {
        stencil_schema::translate(&definition.spec.schema)?
    };
    documents.push((definition.metadata.name.clone(), translated.into_document()));

    for path in &args.addons {
        let addon: Addon = load(path)?;
        let translated = stencil_schema::translate(&addon.spec.schema)?;
        documents.push((addon.metadata.name.clone(), translated.into_document()));
    }

    let out: serde_json::Map<String, Json> = documents.into_iter().collect();
    let text = serde_json::to_string_pretty(&Json::Object(out))?;
    match &args.out {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}

// YAML is a superset of JSON, so one parser covers both input encodings.
fn load<T, P>(path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<std::path::Path>,
{
    let path = path.as_ref();
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
