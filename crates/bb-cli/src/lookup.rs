use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bb_lookup::{
    Collaborators, DomainResolver, FileContentSource, HeuristicResolver, ListMeta, LookupConfig,
    LookupResponse, PslResolver, ReverseLookup, StaticRegistry, TokioScheduler,
};
use bb_lookup_worker::ThreadSpawner;

pub struct LookupOptions {
    pub lists: Vec<String>,
    pub user_filters: Option<String>,
    pub filter: String,
    pub compiled: Option<String>,
    pub cosmetic: Option<String>,
    pub psl: Option<String>,
    pub config: Option<String>,
    pub idle_ttl_secs: Option<u64>,
    pub json: bool,
}

pub struct DomainOptions {
    pub hostnames: Vec<String>,
    pub psl: Option<String>,
}

pub fn run_lookup(opts: LookupOptions) -> Result<(), String> {
    if opts.lists.is_empty() && opts.user_filters.is_none() {
        return Err("No filter lists specified".to_string());
    }
    if opts.filter.is_empty() {
        return Err("Empty filter".to_string());
    }

    let mut config = match &opts.config {
        Some(path) => LookupConfig::from_file(Path::new(path)).map_err(|e| e.to_string())?,
        None => LookupConfig::default(),
    };
    if let Some(secs) = opts.idle_ttl_secs {
        config.idle_ttl = std::time::Duration::from_secs(secs);
    }

    let user_filters_path = opts.user_filters.clone().unwrap_or_default();
    let registry = Arc::new(StaticRegistry::new(user_filters_path.clone()));
    for spec in &opts.lists {
        let (path, title) = parse_list_spec(spec);
        registry.insert(path, ListMeta::new(title));
    }
    if !user_filters_path.is_empty() {
        registry.insert(user_filters_path, ListMeta::default());
    }

    let resolver = load_resolver(opts.psl.as_deref())?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;

    let lookup = ReverseLookup::new(
        config,
        Collaborators {
            spawner: Arc::new(ThreadSpawner),
            registry,
            content: Arc::new(FileContentSource),
            resolver,
            scheduler: Arc::new(TokioScheduler::new(runtime.handle().clone())),
        },
    );

    let start = Instant::now();
    let response = runtime.block_on(async {
        match &opts.cosmetic {
            Some(hostname) => lookup.cosmetic_filter_lookup(hostname, &opts.filter).await,
            None => {
                let compiled = opts.compiled.as_deref().unwrap_or(&opts.filter);
                lookup.net_filter_lookup(compiled, &opts.filter).await
            }
        }
    });
    let elapsed = start.elapsed();
    let live = lookup.is_live();
    lookup.shutdown();
    let response = answered(response, live)?;

    if opts.json {
        let text = serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to encode response: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    print_response(&opts.filter, response.as_ref());
    println!("  Time:     {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

pub fn run_domain(opts: DomainOptions) -> Result<(), String> {
    let resolver = load_resolver(opts.psl.as_deref())?;
    for hostname in &opts.hostnames {
        println!("{} -> {}", hostname, resolver.domain_from_hostname(hostname));
    }
    Ok(())
}

/// A lookup resolving to `None` with no worker left was dropped, not
/// answered.
fn answered(response: Option<LookupResponse>, live: bool) -> Result<Option<LookupResponse>, String> {
    if response.is_none() && !live {
        return Err("Lookup was not answered: background worker unavailable".to_string());
    }
    Ok(response)
}

/// `PATH` or `PATH=TITLE`.
fn parse_list_spec(spec: &str) -> (String, String) {
    match spec.split_once('=') {
        Some((path, title)) => (path.to_string(), title.to_string()),
        None => (spec.to_string(), String::new()),
    }
}

fn load_resolver(psl: Option<&str>) -> Result<Arc<dyn DomainResolver>, String> {
    match psl {
        Some(path) => {
            let resolver = PslResolver::from_file(Path::new(path)).map_err(|e| e.to_string())?;
            Ok(Arc::new(resolver))
        }
        None => Ok(Arc::new(HeuristicResolver)),
    }
}

fn print_response(filter: &str, response: Option<&LookupResponse>) {
    let Some(response) = response else {
        println!("'{}' was not found in any enabled list", filter);
        return;
    };

    println!("'{}' found in {} list(s):", response.filter, response.lists.len());
    for list in &response.lists {
        if list.support_url.is_empty() {
            println!("  {} ({})", list.title, list.path);
        } else {
            println!("  {} ({}) - {}", list.title, list.path, list.support_url);
        }
    }
}
