//! Predefined step registrars.
//!
//! The two canonical step shapes: deploying a package through the full
//! lifecycle, and writing configuration onto a repository node. Both register
//! ordinary steps - anything they do can also be declared by hand through
//! [`Provisioner::step`].

use crate::deploy::{DeployConfig, PackageDeployer, PackageHandle, PackageIdentity};
use crate::error::ProvisionerError;
use crate::provision::provisioner::Provisioner;
use crate::provision::step::slug;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

impl Provisioner {
    /// Declare a step deploying a package to every instance.
    ///
    /// The step id is `deployPackage/<slug(name)>` and its version tag is the
    /// package name, so renaming the package re-triggers the deployment. The
    /// init callback verifies the local file once per run; the sync action
    /// runs upload → install and waits for the instance to come back up.
    pub fn deploy_package(&mut self, name: &str, file: impl Into<PathBuf>, identity: PackageIdentity) {
        let id = format!("deployPackage/{}", slug(name));
        let file = Arc::new(file.into());
        let name = Arc::new(name.to_string());

        let init_file = file.clone();
        let init_name = name.clone();
        let sync_file = file.clone();
        let sync_name = name.clone();

        self.step(&id, move |step| {
            step.description(format!("Deploying package '{name}'"))
                .version(name.as_str())
                .init(move || {
                    let file = init_file.clone();
                    let name = init_name.clone();
                    async move {
                        if !file.exists() {
                            return Err(ProvisionerError::FileNotFound(
                                file.display().to_string(),
                            ));
                        }
                        info!(
                            "Resolved package '{name}' to be deployed is file '{}'",
                            file.display()
                        );
                        Ok(())
                    }
                })
                .sync(move |ctx| {
                    let file = sync_file.clone();
                    let name = sync_name.clone();
                    let identity = identity.clone();
                    async move {
                        info!("Deploying package '{name}' to {}", ctx.instance);

                        let deploy_config = DeployConfig {
                            await_up: ctx.config.await_up.clone(),
                            ..DeployConfig::default()
                        };
                        let deployer =
                            PackageDeployer::with_config(ctx.client.clone(), deploy_config);
                        let mut package = PackageHandle::new(file.as_path(), identity);

                        deployer.deploy(&mut package, &ctx.cancel).await?;
                        Ok(())
                    }
                });
        });
    }

    /// Declare a step writing properties onto a repository node.
    pub fn configure_node(&mut self, id: &str, node_path: &str, properties: Vec<(String, String)>) {
        let node_path = Arc::new(node_path.to_string());
        let properties = Arc::new(properties);
        let description_path = node_path.clone();

        self.step(id, move |step| {
            step.description(format!("Configuring node '{description_path}'"))
                .sync(move |ctx| {
                    let node_path = node_path.clone();
                    let properties = properties.clone();
                    async move {
                        let props: Vec<(&str, String)> = properties
                            .iter()
                            .map(|(key, value)| (key.as_str(), value.clone()))
                            .collect();
                        ctx.client.node_save(&node_path, &props).await?;
                        info!("Configured node '{node_path}' at {}", ctx.instance);
                        Ok(())
                    }
                });
        });
    }
}
