use clap::Parser;
use conduit_gateway::opt::Opt;

#[tokio::main]
async fn main() {
    if let Err(err) = conduit_gateway::run(Opt::parse()).await {
        tracing::error!(error = %err, "conduit gateway exited with an error");
        std::process::exit(1);
    }
}
