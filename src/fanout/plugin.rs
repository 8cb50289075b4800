//! Segment plugin configuration
//!
//! The external segment plugin reads its S3 credentials from a YAML file at
//! a well-known path on every segment host. This module renders that file
//! and pushes it out over scp before any COPY runs.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::S3Params;
use crate::manifest::layout;

use super::{distribute_file, FanoutError, FanoutResult};

/// On-disk shape expected by the segment plugin.
#[derive(Debug, Serialize)]
pub struct PluginConfig {
    pub executablepath: String,
    pub options: PluginOptions,
}

#[derive(Debug, Serialize)]
pub struct PluginOptions {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub folder: String,
}

impl PluginConfig {
    pub fn new(s3: &S3Params, gphome: &str) -> Self {
        Self {
            executablepath: format!("{}/bin/gpbackup_s3_plugin", gphome),
            options: PluginOptions {
                aws_access_key_id: s3.id.clone(),
                aws_secret_access_key: s3.key.clone(),
                bucket: s3.bucket.clone(),
                endpoint: format!("http://{}", s3.endpoint),
                folder: s3.folder.clone(),
            },
        }
    }

    /// Write the config to `/tmp/gpdbbr_<T>_s3.yaml` locally and copy it to
    /// the same path on every segment host.
    pub async fn write_and_distribute(
        &self,
        timestamp: &str,
        hosts: &[String],
    ) -> FanoutResult<PathBuf> {
        let path = layout::plugin_config_path(timestamp);

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| FanoutError::PluginConfig(path.display().to_string(), e.to_string()))?;
        tokio::fs::write(&path, yaml)
            .await
            .map_err(|e| FanoutError::PluginConfig(path.display().to_string(), e.to_string()))?;

        distribute_file(&path, hosts).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> S3Params {
        S3Params {
            endpoint: "10.0.0.1:9000".into(),
            id: "admin".into(),
            key: "secret".into(),
            bucket: "bk".into(),
            folder: "sales".into(),
        }
    }

    #[test]
    fn test_plugin_config_yaml_shape() {
        let config = PluginConfig::new(&params(), "/usr/local/greenplum-db");
        let yaml = serde_yaml::to_string(&config).unwrap();

        assert!(yaml.contains("executablepath: /usr/local/greenplum-db/bin/gpbackup_s3_plugin"));
        assert!(yaml.contains("aws_access_key_id: admin"));
        assert!(yaml.contains("aws_secret_access_key: secret"));
        assert!(yaml.contains("bucket: bk"));
        assert!(yaml.contains("endpoint: http://10.0.0.1:9000"));
        assert!(yaml.contains("folder: sales"));
    }
}
