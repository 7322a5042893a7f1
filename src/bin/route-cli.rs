use std::path::PathBuf;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use url::Url;

use route_resolver::deployment::{load_deployment, Deployment};
use route_resolver::routing::{NoMiddleware, Outcome, RequestContext, ResolutionResult};

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Offline tooling for deployment manifests", long_about = None)]
struct Cli {
    /// Path to the deployment manifest.
    #[arg(short, long, default_value = "deployment.json")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest and print a summary
    Check,
    /// Resolve a URL against the manifest (middleware disabled)
    Resolve {
        /// Absolute request URL, e.g. http://localhost/blog/hello
        url: String,

        /// Request header as `name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let deployment = load_deployment(&cli.manifest)?;

    let output = match cli.command {
        Commands::Check => summary(&deployment),
        Commands::Resolve { url, headers } => {
            let url = Url::parse(&url)?;
            let headers = parse_headers(&headers)?;
            let context = RequestContext::new("route-cli");
            let result = deployment
                .resolve(url, headers, Bytes::new(), &NoMiddleware, &context)
                .await?;
            describe(&result)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn summary(deployment: &Deployment) -> Value {
    let mut pathnames: Vec<&String> = deployment.pathnames.iter().collect();
    pathnames.sort();
    json!({
        "buildId": deployment.build_id,
        "basePath": deployment.base_path,
        "rules": deployment.routes.len(),
        "locales": deployment.i18n.as_ref().map(|i18n| i18n.locales.clone()),
        "pathnames": pathnames,
    })
}

fn describe(result: &ResolutionResult) -> Value {
    let mut out = Map::new();
    out.insert("outcome".into(), json!(result.outcome.label()));
    match &result.outcome {
        Outcome::Redirect { url, status } => {
            out.insert("location".into(), json!(url.as_str()));
            out.insert("redirectStatus".into(), json!(status));
        }
        Outcome::ExternalRewrite { url } => {
            out.insert("target".into(), json!(url.as_str()));
        }
        Outcome::Matched { pathname, route_matches } => {
            out.insert("pathname".into(), json!(pathname));
            out.insert("routeMatches".into(), json!(route_matches));
        }
        Outcome::MiddlewareResponded { status, body } => {
            out.insert("responseStatus".into(), json!(status));
            out.insert("bodyBytes".into(), json!(body.len()));
        }
        Outcome::NoMatch => {}
    }
    out.insert("url".into(), json!(result.url.as_str()));
    out.insert("status".into(), json!(result.status));
    out.insert("locale".into(), json!(result.locale));

    let headers: Map<String, Value> = result
        .resolved_headers
        .iter()
        .map(|(name, value)| (name.to_string(), json!(value.to_str().unwrap_or("<binary>"))))
        .collect();
    out.insert("resolvedHeaders".into(), Value::Object(headers));
    Value::Object(out)
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| format!("header `{entry}` is not `name: value`"))?;
        headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    Ok(headers)
}
