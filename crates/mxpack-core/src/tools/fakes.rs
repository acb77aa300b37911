//! In-memory tool adapters for tests.

use super::{
    Builder, CMakeInvocation, Deployer, LinkEditor, Resolver, Signer, ToolError, ToolOutput,
    Toolbox, Vcs,
};
use crate::env::Environment;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn failed(tool: &'static str, stderr: &str) -> ToolError {
    ToolError::Failed {
        tool,
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeResolver {
    env: Vec<(String, String)>,
    failure: Option<String>,
    versions: Vec<String>,
    requests: RefCell<Vec<Vec<String>>>,
}

impl FakeResolver {
    pub(crate) fn with_env(vars: &[(&str, &str)]) -> Self {
        Self {
            env: vars
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn failing(description: &str) -> Self {
        Self {
            failure: Some(description.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn with_versions(versions: &[&str]) -> Self {
        Self {
            versions: versions.iter().map(|v| (*v).to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<Vec<String>> {
        self.requests.borrow().clone()
    }
}

impl Resolver for FakeResolver {
    fn resolve(&self, request: &[String]) -> Result<Environment, ToolError> {
        self.requests.borrow_mut().push(request.to_vec());
        if let Some(description) = &self.failure {
            return Err(failed("rez-env", description));
        }
        Ok(self.env.iter().cloned().collect())
    }

    fn versions(&self, _package: &str) -> Result<Vec<String>, ToolError> {
        Ok(self.versions.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeBuilder {
    pub(crate) configure_output: ToolOutput,
    pub(crate) build_output: ToolOutput,
    pub(crate) steps: RefCell<Vec<(String, Vec<String>)>>,
}

impl FakeBuilder {
    pub(crate) fn succeeding() -> Self {
        Self {
            configure_output: ToolOutput::ok(),
            build_output: ToolOutput::ok(),
            steps: RefCell::default(),
        }
    }
}

impl Builder for FakeBuilder {
    fn configure(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        self.steps
            .borrow_mut()
            .push(("configure".to_string(), invocation.flags.to_vec()));
        Ok(self.configure_output.clone())
    }

    fn build_install(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        self.steps
            .borrow_mut()
            .push(("build".to_string(), vec![invocation.jobs.to_string()]));
        Ok(self.build_output.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeSigner {
    pub(crate) fail: bool,
    pub(crate) signed: RefCell<Vec<PathBuf>>,
}

impl Signer for FakeSigner {
    fn sign(&self, path: &Path) -> Result<(), ToolError> {
        if self.fail {
            return Err(failed("codesign", "errSecInternalComponent"));
        }
        self.signed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeLinker {
    /// Libraries reported per file name.
    pub(crate) libraries: HashMap<String, Vec<String>>,
    pub(crate) reject_rpath: bool,
    pub(crate) rpaths: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl LinkEditor for FakeLinker {
    fn add_rpath(&self, path: &Path, rpath: &Path) -> Result<(), ToolError> {
        if self.reject_rpath {
            return Err(failed("install_name_tool", "would duplicate path"));
        }
        self.rpaths
            .borrow_mut()
            .push((path.to_path_buf(), rpath.to_path_buf()));
        Ok(())
    }

    fn linked_libraries(&self, path: &Path) -> Result<Vec<String>, ToolError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.libraries.get(&name).cloned().unwrap_or_default())
    }
}

pub(crate) struct FakeVcs {
    pub(crate) branch: String,
    pub(crate) commit: String,
    pub(crate) fail_tag: bool,
    pub(crate) tags: RefCell<Vec<String>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            branch: "materialx-main".to_string(),
            commit: "0123abcd".to_string(),
            fail_tag: false,
            tags: RefCell::default(),
        }
    }
}

impl Vcs for FakeVcs {
    fn branch(&self) -> Result<String, ToolError> {
        Ok(self.branch.clone())
    }

    fn head_commit(&self) -> Result<String, ToolError> {
        Ok(self.commit.clone())
    }

    fn create_tag(&self, tag: &str, _message: &str) -> Result<(), ToolError> {
        if self.fail_tag {
            return Err(failed("git", "tag already exists"));
        }
        self.tags.borrow_mut().push(tag.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeDeployer {
    pub(crate) precache: PathBuf,
    pub(crate) fail: bool,
    /// Create the expected precache directory when a variant is deployed.
    pub(crate) materialize: bool,
    pub(crate) calls: RefCell<Vec<String>>,
}

impl Deployer for FakeDeployer {
    fn cache(&self, packages: &[String]) -> Result<(), ToolError> {
        self.calls
            .borrow_mut()
            .push(format!("cache {}", packages.join(" ")));
        Ok(())
    }

    fn deploy_manifest(&self, _dir: &Path, name: &str, version: &str) -> Result<(), ToolError> {
        if self.fail {
            return Err(failed("rez-deploy", "permission denied"));
        }
        self.calls
            .borrow_mut()
            .push(format!("manifest {name} {version}"));
        Ok(())
    }

    fn deploy_variant(
        &self,
        _dir: &Path,
        name: &str,
        version: &str,
        keys: &[String],
    ) -> Result<(), ToolError> {
        if self.fail {
            return Err(failed("rez-deploy", "permission denied"));
        }
        if self.materialize {
            let mut target = self.precache.join(name).join(version);
            target.extend(keys);
            std::fs::create_dir_all(&target).map_err(|source| ToolError::Spawn {
                tool: "rez-deploy",
                source,
            })?;
        }
        self.calls
            .borrow_mut()
            .push(format!("variant {name} {version} {}", keys.join(" ")));
        Ok(())
    }

    fn precache_root(&self) -> Result<PathBuf, ToolError> {
        Ok(self.precache.clone())
    }
}

impl Toolbox {
    /// A toolbox where every adapter is a default fake.
    pub(crate) fn fake() -> Self {
        Self {
            resolver: Box::new(FakeResolver::default()),
            builder: Box::new(FakeBuilder::succeeding()),
            signer: Box::new(FakeSigner::default()),
            linker: Box::new(FakeLinker::default()),
            vcs: Box::new(FakeVcs::default()),
            deployer: Box::new(FakeDeployer::default()),
        }
    }
}
