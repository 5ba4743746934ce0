use std::io;

use ma_core::agent::Agent;
use ma_core::audit::AuditLogger;
use ma_core::build_backend;
use ma_core::config::Config;
use ma_core::logging;
use ma_core::operator::TerminalOperator;
use ma_core::renderer::Renderer;
use ma_core::repl::run_repl;
use ma_core::style::Style;

fn print_help() {
    println!("minagent — shell agent that asks before it runs anything");
    println!();
    println!("Usage:");
    println!("  minagent              Start an interactive session");
    println!();
    println!("Options:");
    println!("  -d, --debug     Debug logging to stderr (overrides RUST_LOG)");
    println!("  -V, --version   Print version");
    println!("  -h, --help      Print this help");
    println!();
    println!("Environment:");
    println!("  MINAGENT_PROVIDER     groq, openai, deepseek, anthropic, or a configured name");
    println!("  MINAGENT_MODEL        Model identifier");
    println!("  MINAGENT_TEMPERATURE  Sampling temperature (0-2)");
    println!("  WORKSPACE_ROOT        Directory commands run in");
    println!("  <PROVIDER>_API_KEY    API key, e.g. GROQ_API_KEY");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("minagent {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let debug = args.iter().any(|a| a == "--debug" || a == "-d");
    if let Some(unknown) = args.iter().find(|a| *a != "--debug" && *a != "-d") {
        eprintln!("error: unknown argument '{unknown}'");
        eprintln!("hint: run `minagent --help` for usage");
        std::process::exit(2);
    }

    // Variables already set in the environment win over .env
    dotenv::dotenv().ok();
    logging::init(debug);

    let settings = match Config::load_or_default().resolve() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?settings, "resolved settings");

    let backend = match build_backend(&settings) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("error: failed to create {} client: {e}", settings.provider);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    let mut renderer = Renderer::new(io::stdout(), Style::new());
    renderer.emit_banner(&settings.model, &settings.provider, &settings.workspace_root);

    let (audit, audit_err) = AuditLogger::open_or_noop(settings.audit_path.as_deref());
    if let Some(e) = audit_err {
        renderer.emit_warning(&format!("audit log disabled: {e}"));
    }

    let result = runtime.block_on(async {
        let mut agent = Agent::new(backend, &settings, TerminalOperator::new(), renderer)
            .with_audit(audit);
        run_repl(&mut agent).await
    });

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
