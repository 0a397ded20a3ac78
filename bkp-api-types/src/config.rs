use serde::{Deserialize, Serialize};

/// Configuration options the engine consumes. Loading this from a file is
/// the CLI's job and stays out of scope; this is the plain deserializable
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    pub broker_url: String,
    pub machine_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub api_url: String,
    /// Worker-pool size; 0 means "derive from CPU count" (20% of logical
    /// cores, minimum 2).
    #[serde(default)]
    pub num_goroutine: usize,
    /// KB/s; 0 means unlimited.
    #[serde(default)]
    pub limit_upload: u64,
    /// KB/s; 0 means unlimited.
    #[serde(default)]
    pub limit_download: u64,
}

impl AgentConfig {
    /// 20% of logical cores, minimum 2. Used for both the upload worker
    /// pool and the restore node-level semaphore unless overridden.
    pub fn worker_pool_size(&self, logical_cores: usize) -> usize {
        if self.num_goroutine > 0 {
            return self.num_goroutine;
        }
        ((logical_cores as f64 * 0.2).ceil() as usize).max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_pool_size_from_cores() {
        let cfg = AgentConfig {
            broker_url: String::new(),
            machine_id: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            api_url: String::new(),
            num_goroutine: 0,
            limit_upload: 0,
            limit_download: 0,
        };
        assert_eq!(cfg.worker_pool_size(4), 2);
        assert_eq!(cfg.worker_pool_size(64), 13);
    }

    #[test]
    fn explicit_pool_size_wins() {
        let mut cfg = AgentConfig {
            broker_url: String::new(),
            machine_id: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            api_url: String::new(),
            num_goroutine: 0,
            limit_upload: 0,
            limit_download: 0,
        };
        cfg.num_goroutine = 7;
        assert_eq!(cfg.worker_pool_size(4), 7);
    }
}
