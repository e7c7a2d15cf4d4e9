//! nodeflow - run node graphs from the command line
//!
//! Without `--load`, a sample graph is built that doubles every number of a
//! list inside a "For Each" loop and shows the collected result.

use clap::Parser;
use egui::Pos2;
use log::{error, info};
use nodeflow::contexts::MathContext;
use nodeflow::{EditorConfig, Feedback, FeedbackType, FileManager, NodeEditor, Value};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nodeflow", version = env!("CARGO_PKG_VERSION"), about = "Build, run and save dataflow node graphs")]
struct Cli {
    /// Editor configuration file (JSON)
    #[arg(short, long, default_value = "nodeflow.json")]
    config: PathBuf,

    /// Graph document to load instead of the sample graph
    #[arg(short, long)]
    load: Option<PathBuf>,

    /// Where to save the graph; `.json` selects the JSON format
    #[arg(short, long)]
    save: Option<PathBuf>,

    /// Items of the sample graph's input list
    #[arg(long, value_delimiter = ',', default_values_t = [1.0, 2.0, 3.0])]
    values: Vec<f64>,

    /// Factor applied to every item by the sample graph
    #[arg(long, default_value_t = 2.0)]
    factor: f64,

    /// Skip execution
    #[arg(long)]
    no_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = EditorConfig::load(&cli.config);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str()))
        .format_timestamp(None)
        .init();

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: EditorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (mut editor, mut files) = open(&cli, config)?;
    info!("{}: {} nodes", files.get_file_display_name(), editor.nodes().len());

    if !cli.no_run {
        editor.set_feedback_listener(Some(Box::new(|feedback: &Feedback| {
            if feedback.severity == FeedbackType::Info {
                println!("{}", feedback.message);
            }
        })));
        editor.execute(None)?;
        let stats = editor.stats();
        info!(
            "Executed {} nodes ({} flow-control runs, {} back executions)",
            stats.executed_nodes, stats.flow_control_runs, stats.back_executions
        );
    }

    match &cli.save {
        Some(path) => files.save_to_file(path, &mut editor)?,
        None if files.has_unsaved_changes() => {
            info!("{} was not saved, pass --save to keep it", files.get_file_display_name());
        }
        None => {}
    }
    Ok(())
}

/// Loads `--load`, or builds the sample graph as a new unsaved document
fn open(cli: &Cli, config: EditorConfig) -> Result<(NodeEditor<MathContext>, FileManager), Box<dyn std::error::Error>> {
    let mut editor = NodeEditor::with_config(MathContext::new(), config);
    let mut files = FileManager::new();
    match &cli.load {
        Some(path) => files.load_from_file(path, &mut editor)?,
        None => {
            build_sample(&mut editor, &cli.values, cli.factor)?;
            files.mark_modified();
        }
    }
    Ok((editor, files))
}

/// Starter -> For Each (item * factor) -> Show Value(result)
fn build_sample(editor: &mut NodeEditor<MathContext>, values: &[f64], factor: f64) -> Result<(), Box<dyn std::error::Error>> {
    let mut add = |method: &str, x: f32, y: f32| {
        editor
            .add_node_by_method_name(method, Pos2::new(x, y))
            .ok_or_else(|| format!("unknown operation '{}'", method))
    };
    let starter = add("Starter", 0.0, 0.0)?;
    let list = add("NumberListValue", 0.0, 150.0)?;
    let factor_node = add("InputValue", 250.0, 300.0)?;
    let for_each = add("ForEach", 250.0, 0.0)?;
    let multiply = add("Multiply", 550.0, 150.0)?;
    let show = add("ShowValue", 550.0, 0.0)?;

    let graph = editor.graph_mut();
    if let Some(node) = graph.node_mut(list) {
        node.set_value("inValue", Value::floats(values));
    }
    if let Some(node) = graph.node_mut(factor_node) {
        node.set_value("inValue", Value::Float(factor));
    }

    editor.connect_sockets(starter, "Exit", for_each, "Enter")?;
    editor.connect_sockets(list, "outValue", for_each, "inputCollection")?;
    editor.connect_sockets(for_each, "forEachItemLoop", multiply, "Enter")?;
    editor.connect_sockets(for_each, "currentItemInLoop", multiply, "a")?;
    editor.connect_sockets(factor_node, "outValue", multiply, "b")?;
    editor.connect_sockets(multiply, "result", for_each, "loopResult")?;
    editor.connect_sockets(for_each, "Exit", show, "Enter")?;
    editor.connect_sockets(for_each, "forEachResult", show, "x")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_unsaved_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");

        let cli = Cli::parse_from(["nodeflow", "--values", "1,2"]);
        let (mut editor, mut files) = open(&cli, EditorConfig::default()).unwrap();
        assert!(files.has_unsaved_changes());
        assert_eq!(files.get_file_display_name(), "Untitled*");
        assert_eq!(editor.nodes().len(), 6);

        files.save_to_file(&path, &mut editor).unwrap();
        assert!(!files.has_unsaved_changes());

        let cli = Cli::parse_from(["nodeflow", "--load", path.to_str().unwrap()]);
        let (mut loaded, files) = open(&cli, EditorConfig::default()).unwrap();
        assert!(!files.has_unsaved_changes());
        assert_eq!(files.get_file_display_name(), "sample.json");

        loaded.execute(None).unwrap();
        assert_eq!(loaded.context().shown, vec!["2, 4"]);
    }
}
