//! Plain-text formatting of platform records for chat notices

use crate::platform::{ApplicationRecord, AssetRecord, EnvironmentRecord};

fn code_block(items: Vec<String>) -> String {
    format!("```{}```", items.join("\n\n"))
}

pub fn applications(apps: &[ApplicationRecord]) -> String {
    if apps.is_empty() {
        return "No applications deployed in this environment".to_string();
    }
    code_block(
        apps.iter()
            .map(|app| {
                format!(
                    "Name : {}\nStatus : {}\nWorkers Cpu : {}\nWorkers Memory : {}",
                    app.domain, app.status, app.worker_cpu, app.worker_memory
                )
            })
            .collect(),
    )
}

pub fn environments(envs: &[EnvironmentRecord]) -> String {
    if envs.is_empty() {
        return "No environments found for this business group".to_string();
    }
    envs.iter()
        .map(|env| {
            format!(
                "Env-Name : {}\nEnv-Id : {}\nIs-Production : {}",
                env.name, env.id, env.is_production
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn assets(assets: &[AssetRecord]) -> String {
    if assets.is_empty() {
        return "No assets published in exchange".to_string();
    }
    code_block(
        assets
            .iter()
            .map(|asset| {
                format!(
                    "Asset Name :- {}\nGroup Id :- {}\nAsset Id :- {}\nVersion :- {}\nAsset Link :- {}\nDescription :- {}",
                    asset.name,
                    asset.group_id,
                    asset.asset_id,
                    asset.version,
                    asset.asset_link.as_deref().unwrap_or("-"),
                    asset.description
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applications_render_one_block_per_app() {
        let apps = vec![
            ApplicationRecord {
                domain: "api-gw".into(),
                status: "RUNNING".into(),
                worker_cpu: "0.1 vCores".into(),
                worker_memory: "500 MB".into(),
            },
            ApplicationRecord {
                domain: "batch".into(),
                status: "UNDEPLOYED".into(),
                worker_cpu: "1 vCore".into(),
                worker_memory: "1.5 GB".into(),
            },
        ];
        let text = applications(&apps);
        assert!(text.starts_with("```Name : api-gw\nStatus : RUNNING"));
        assert!(text.contains("\n\nName : batch"));
        assert!(text.ends_with("Workers Memory : 1.5 GB```"));
    }

    #[test]
    fn test_empty_listings_say_so() {
        assert!(applications(&[]).contains("No applications"));
        assert!(environments(&[]).contains("No environments"));
        assert!(assets(&[]).contains("No assets"));
    }

    #[test]
    fn test_environments_show_production_flag() {
        let text = environments(&[EnvironmentRecord {
            id: "env-1".into(),
            name: "prod".into(),
            organization_id: "org-1".into(),
            is_production: true,
        }]);
        assert_eq!(text, "Env-Name : prod\nEnv-Id : env-1\nIs-Production : true");
    }
}
