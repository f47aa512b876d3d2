use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use slquery_client::{
    ClientConfig, Domain, HttpClient, PartNumberCache, QueryHandler, RecordQuery,
    RecordQueryHandler, ReqwestHttpClient, WorkspaceCache,
};
use slquery_core::{ScopedVars, UnknownFieldPolicy, VariableInterpolator, VariableValue};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Query a record API and print the result table as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Record domain to query
    #[arg(value_enum)]
    domain: Domain,

    /// Base URL of the API
    #[arg(long, env = "SLQUERY_URL")]
    url: String,

    /// API key sent with every request
    #[arg(long, env = "SLQUERY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Filter in UI form; logical fields are rewritten before sending
    #[arg(long, default_value = "")]
    filter: String,

    /// Total records to return
    #[arg(long, conflicts_with = "all")]
    take: Option<u32>,

    /// Fetch every page regardless of take
    #[arg(long)]
    all: bool,

    #[arg(long)]
    order_by: Option<String>,

    #[arg(long, requires = "order_by")]
    descending: bool,

    /// Template variable, `name=value` or `name=v1,v2`
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Column to include; repeat for more. Defaults to the domain's columns.
    #[arg(long = "column")]
    columns: Vec<String>,

    /// Ask the server for the total match count
    #[arg(long)]
    count: bool,

    /// Fail on malformed filters and unknown fields
    #[arg(long)]
    strict: bool,

    /// Print the transformed filter and exit without querying
    #[arg(long)]
    compile_only: bool,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    if name.is_empty() {
        return Err("variable name is empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}

fn variable_value(raw: &str) -> VariableValue {
    if raw.contains(',') {
        VariableValue::Multi(raw.split(',').map(str::to_string).collect())
    } else {
        VariableValue::Single(raw.to_string())
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("slquery=info,slquery_client=info,slquery_core=warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            ..ClientConfig::default()
        }
    }

    fn query(&self) -> RecordQuery {
        RecordQuery {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            descending: self.descending,
            take: self.take,
            fetch_all: self.all,
            return_count: self.count,
            columns: self.columns.clone(),
            hide: false,
        }
    }

    fn resolver(&self) -> VariableInterpolator {
        self.vars
            .iter()
            .fold(VariableInterpolator::new(), |resolver, (name, value)| {
                resolver.with_variable(name.clone(), variable_value(value))
            })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let descriptor = cli.domain.descriptor();
    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new(cli.client_config()).context("building HTTP client")?);
    let workspaces = Arc::new(WorkspaceCache::workspaces(Arc::clone(&http)));
    let policy = if cli.strict {
        UnknownFieldPolicy::Reject
    } else {
        UnknownFieldPolicy::PassThrough
    };
    let mut handler = RecordQueryHandler::new(descriptor, Arc::clone(&http), workspaces)
        .with_resolver(Arc::new(cli.resolver()))
        .with_policy(policy);
    if descriptor.part_number_field.is_some() {
        handler = handler.with_part_numbers(Arc::new(PartNumberCache::part_numbers(http)));
    }

    let query = cli.query();
    let scoped = ScopedVars::new();
    if cli.compile_only {
        println!("{}", handler.transform_filter(&query.filter, &scoped));
        return Ok(());
    }

    tracing::info!(domain = descriptor.name, endpoint = descriptor.endpoint, "running query");
    let table = handler
        .run_query(&query, &scoped)
        .await
        .with_context(|| format!("querying {}", descriptor.name))?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["slquery", "alarms", "--url", "http://host"]);
        assert_eq!(cli.domain, Domain::Alarms);
        assert!(cli.filter.is_empty());
        assert_eq!(cli.timeout_secs, 30);
        let query = cli.query();
        assert_eq!(query.take, None);
        assert!(!query.fetch_all);
        assert_eq!(cli.client_config().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parses_query_options() {
        let cli = Cli::parse_from([
            "slquery",
            "test-plans",
            "--url",
            "http://host",
            "--filter",
            r#"state = "NEW""#,
            "--take",
            "25",
            "--order-by",
            "updatedAt",
            "--descending",
            "--var",
            "ws=a,b",
            "--column",
            "id",
            "--column",
            "productName",
        ]);
        assert_eq!(cli.domain, Domain::TestPlans);
        let query = cli.query();
        assert_eq!(query.take, Some(25));
        assert!(query.descending);
        assert_eq!(query.columns, vec!["id", "productName"]);
        assert_eq!(cli.vars, vec![("ws".to_string(), "a,b".to_string())]);
    }

    #[test]
    fn take_conflicts_with_all() {
        let result =
            Cli::try_parse_from(["slquery", "results", "--url", "u", "--take", "5", "--all"]);
        assert!(result.is_err());
    }

    #[test]
    fn variables() {
        assert_eq!(parse_var("a=b=c"), Ok(("a".into(), "b=c".into())));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
        assert_eq!(
            variable_value("s1,s2"),
            VariableValue::Multi(vec!["s1".into(), "s2".into()])
        );
        assert_eq!(variable_value("s1"), VariableValue::Single("s1".into()));
    }
}
