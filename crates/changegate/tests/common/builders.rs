//! Builders for test snapshots.

#![allow(dead_code)]

use std::collections::HashMap;

use changegate::{ObjectMeta, ResourceIdentity, Snapshot};

/// Spec of the deployment-like resource used throughout the tests.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub image: String,
}

pub type Deployment = Snapshot<DeploymentSpec>;

/// Builder for `Deployment` snapshots.
pub struct DeploymentBuilder {
    namespace: String,
    name: String,
    replicas: u32,
    image: String,
    labels: HashMap<String, String>,
}

impl DeploymentBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            namespace: "default".to_string(),
            name: name.to_string(),
            replicas: 1,
            image: "nginx:1.27".to_string(),
            labels: HashMap::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn image(mut self, image: &str) -> Self {
        self.image = image.to_string();
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Deployment {
        let mut meta = ObjectMeta::new(self.namespace, self.name);
        meta.labels = self.labels;
        Snapshot::new(
            "apps/v1",
            "Deployment",
            meta,
            DeploymentSpec {
                replicas: self.replicas,
                image: self.image,
            },
        )
    }
}

pub fn identity(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("default", name)
}
