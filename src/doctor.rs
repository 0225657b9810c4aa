use docflow_core::config::AppConfig;
use docflow_llm::presets::get_preset;
use docflow_memory::SqliteCache;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let checks = [
        check_api_key(config),
        check_workspace(config),
        check_database(config),
        check_embedding(config),
        check_web_search(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn is_set(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.is_empty() && !k.starts_with("${"))
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let provider = &config.model.provider;
    let Some(preset) = get_preset(provider) else {
        return CheckResult {
            label: "Model".into(),
            ok: config.model.base_url.is_some(),
            detail: match &config.model.base_url {
                Some(url) => format!("{} via custom endpoint {}", config.model.model_id, url),
                None => format!("Unknown provider '{}' needs model.base_url", provider),
            },
        };
    };

    if !preset.needs_api_key || is_set(config.model.api_key.as_deref()) {
        CheckResult {
            label: "Model".into(),
            ok: true,
            detail: format!("Configured for {} ({})", config.model.model_id, provider),
        }
    } else {
        CheckResult {
            label: "Model".into(),
            ok: false,
            detail: format!("No API key set for provider '{}'", provider),
        }
    }
}

fn check_workspace(config: &AppConfig) -> CheckResult {
    let ws = config.workspace_dir();
    if !ws.is_dir() {
        return CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (does not exist)", ws.display()),
        };
    }

    let test_file = ws.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Workspace".into(),
                ok: true,
                detail: format!("{}", ws.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (not writable: {})", ws.display(), e),
        },
    }
}

fn check_database(config: &AppConfig) -> CheckResult {
    let db_path = config.database_path();
    match SqliteCache::open(&db_path, config.cache.ttl_days).and_then(|c| c.stats()) {
        Ok(stats) => CheckResult {
            label: "Database".into(),
            ok: true,
            detail: format!(
                "{} ({} summaries, {} expired, {} run-log lines)",
                db_path.display(),
                stats.summaries,
                stats.expired,
                stats.run_logs
            ),
        },
        Err(e) => CheckResult {
            label: "Database".into(),
            ok: false,
            detail: format!("{}: {}", db_path.display(), e),
        },
    }
}

fn check_embedding(config: &AppConfig) -> CheckResult {
    let embedding = config.embedding.clone().unwrap_or_default();
    let key = embedding.api_key.as_deref().or(config.model.api_key.as_deref());
    let local = embedding.base_url.contains("localhost") || embedding.base_url.contains("127.0.0.1");

    if local || is_set(key) {
        CheckResult {
            label: "Embeddings".into(),
            ok: true,
            detail: format!("{} ({} dims) at {}", embedding.model, embedding.dimensions, embedding.base_url),
        }
    } else {
        CheckResult {
            label: "Embeddings".into(),
            ok: false,
            detail: format!("No API key for {}", embedding.base_url),
        }
    }
}

fn check_web_search(config: &AppConfig) -> CheckResult {
    match &config.web_search {
        Some(ws) if ws.is_enabled() => CheckResult {
            label: "Web search".into(),
            ok: ws.provider == "tavily",
            detail: if ws.provider == "tavily" {
                "tavily".into()
            } else {
                format!("Unknown provider '{}'", ws.provider)
            },
        },
        Some(ws) => CheckResult {
            label: "Web search".into(),
            ok: true,
            detail: format!("{} configured without a key (document-only answers)", ws.provider),
        },
        None => CheckResult {
            label: "Web search".into(),
            ok: true,
            detail: "Not configured (document-only answers)".into(),
        },
    }
}
