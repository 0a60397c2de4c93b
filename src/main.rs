use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use pragma::acquire::acquire;
use pragma::ast::Statement;
use pragma::parser;
use pragma::pragma::config::{ConfigValue, PassConfig, PipelineConfig};
use pragma::runtime::Bindings;

const USAGE: &str = "usage: pragma [--config FILE] [--pass NAME]... [--bind NAME=VALUE]... [--function NAME] [--indent] [FILE]";

fn first_function(source: &str) -> Result<String> {
    let program = parser::parse(source).context("Parsing input")?;
    program
        .statements
        .into_iter()
        .find_map(|statement| match statement {
            Statement::FunctionDef(def) => Some(def.name),
            _ => None,
        })
        .ok_or_else(|| anyhow!("No function definition in input"))
}

fn parse_binding(binding: &str) -> Result<(String, ConfigValue)> {
    let (name, value) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{binding}'"))?;
    let value: ConfigValue =
        serde_yaml::from_str(value).with_context(|| format!("Parsing value for '{name}'"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut config = PipelineConfig::default();
    let mut function_name: Option<String> = None;
    let mut scope = Bindings::new();
    let mut indent = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing file after {arg}"))?;
                let raw = fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?;
                let loaded = PipelineConfig::from_yaml(&raw)
                    .with_context(|| format!("Parsing {path}"))?;
                config.passes.extend(loaded.passes);
            }
            "--pass" | "-p" => {
                let name = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing pass name after {arg}"))?;
                config.passes.push(PassConfig::named(&name)?);
            }
            "--bind" | "-b" => {
                let binding = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing NAME=VALUE after {arg}"))?;
                let (name, value) = parse_binding(&binding)?;
                scope.insert(name, value.to_value()?);
            }
            "--function" | "-f" => {
                function_name = Some(
                    args.next()
                        .ok_or_else(|| anyhow!("Missing function name after {arg}"))?,
                );
            }
            "--indent" => indent = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    if config.passes.is_empty() {
        bail!("No passes given\n{USAGE}");
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let function_name = match function_name {
        Some(name) => name,
        None => first_function(&source)?,
    };
    let function = acquire(&source, &function_name, scope)?;
    let pipeline = config.build()?;
    info!(
        "Applying {} passes to '{}'",
        pipeline.len(),
        function_name
    );
    let transformed = pipeline.apply(&function)?;
    info!(
        "Introduced {} auxiliary bindings",
        transformed.auxiliary.len()
    );

    if indent {
        print!("{}", transformed.source_at_baseline());
    } else {
        print!("{}", transformed.source());
    }
    Ok(())
}
