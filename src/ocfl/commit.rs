//! The commit engine. A commit is expressed as an [`UpdatePlan`]: an ordered,
//! serialisable, partially concurrent, reversible sequence of steps that
//! writes one new version into an object root.
//!
//! The root sidecar write is always the final step and is the point at which
//! the new version becomes the committed head. Everything before it is either
//! content-addressed (safe to re-apply) or removable by [`UpdatePlan::revert`].

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::ocfl::digest::{DigestAlgorithm, DigestSet, HexDigest};
use crate::ocfl::digest_map::DigestMap;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs::walk::{default_width, digest_files, walk_files};
use crate::ocfl::fs::{Cancel, Fs, WriteFs};
use crate::ocfl::inventory::{sidecar_line, ContentPathFn, Inventory, StoredInventory};
use crate::ocfl::paths;
use crate::ocfl::spec::SpecVersion;
use crate::ocfl::types::{ContentPath, LogicalPath};

/// Resolves a content digest to the backend and path holding its bytes
pub trait ContentSource: Send + Sync {
    fn resolve(&self, digest: &HexDigest) -> Option<(Arc<dyn Fs>, String)>;
}

/// Resolves a content digest to additional digests of the same bytes under
/// other algorithms
pub trait FixitySource: Send + Sync {
    fn fixity(&self, digest: &HexDigest) -> HashMap<DigestAlgorithm, HexDigest>;
}

/// A content-addressed description of the files that should appear in the
/// next version of an object: the logical state, plus a resolver from digest
/// to source bytes.
pub struct Stage {
    pub state: DigestMap<LogicalPath>,
    pub digest_algorithm: DigestAlgorithm,
    pub content: Arc<dyn ContentSource>,
    pub fixity: Option<Arc<dyn FixitySource>>,
}

/// Content source over files sitting in a directory of some backend
struct DirContentSource {
    fs: Arc<dyn Fs>,
    dir: String,
    locations: HashMap<HexDigest, String>,
}

struct MapFixitySource {
    map: HashMap<HexDigest, HashMap<DigestAlgorithm, HexDigest>>,
}

impl ContentSource for DirContentSource {
    fn resolve(&self, digest: &HexDigest) -> Option<(Arc<dyn Fs>, String)> {
        self.locations
            .get(digest)
            .map(|path| (self.fs.clone(), paths::join(&self.dir, path)))
    }
}

impl FixitySource for MapFixitySource {
    fn fixity(&self, digest: &HexDigest) -> HashMap<DigestAlgorithm, HexDigest> {
        self.map.get(digest).cloned().unwrap_or_default()
    }
}

impl Stage {
    pub fn new(
        state: DigestMap<LogicalPath>,
        digest_algorithm: DigestAlgorithm,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            state,
            digest_algorithm,
            content,
            fixity: None,
        }
    }

    pub fn with_fixity(mut self, fixity: Arc<dyn FixitySource>) -> Self {
        self.fixity = Some(fixity);
        self
    }

    /// Stages every file under `dir` as the logical tree of the next version,
    /// digesting concurrently. `fixity_algorithms` are computed in the same
    /// pass and exposed through the stage's fixity source.
    pub fn of_dir(
        fs: Arc<dyn Fs>,
        dir: &str,
        digest_algorithm: DigestAlgorithm,
        fixity_algorithms: &[DigestAlgorithm],
        width: usize,
        cancel: &Cancel,
    ) -> Result<Stage> {
        let files = walk_files(fs.as_ref(), dir, cancel)?;

        let mut algorithms = vec![digest_algorithm];
        algorithms.extend_from_slice(fixity_algorithms);

        let full_paths = files
            .iter()
            .map(|file| paths::join(dir, file))
            .collect::<Vec<_>>();

        let mut digests: HashMap<String, DigestSet> = HashMap::with_capacity(files.len());

        let pipeline = digest_files(
            fs.clone(),
            full_paths,
            algorithms,
            width.max(1),
            cancel,
        );

        for item in pipeline {
            cancel.check()?;
            digests.insert(item.path, item.result?);
        }

        let mut state = DigestMap::new();
        let mut locations = HashMap::with_capacity(files.len());
        let mut fixity: HashMap<HexDigest, HashMap<DigestAlgorithm, HexDigest>> = HashMap::new();

        for file in files {
            let mut set = digests
                .remove(&paths::join(dir, &file))
                .expect("every staged file was digested");

            let digest = set
                .remove(digest_algorithm)
                .expect("the primary algorithm was computed")
                .to_lower();

            locations.insert(digest.clone(), file.clone());

            if !fixity_algorithms.is_empty() {
                let extra = fixity.entry(digest.clone()).or_default();
                for algorithm in fixity_algorithms {
                    if let Some(value) = set.remove(*algorithm) {
                        extra.insert(*algorithm, value);
                    }
                }
            }

            state.insert(digest, file.try_into()?)?;
        }

        let mut stage = Stage::new(
            state,
            digest_algorithm,
            Arc::new(DirContentSource {
                fs,
                dir: dir.to_string(),
                locations,
            }),
        );

        if !fixity_algorithms.is_empty() {
            stage = stage.with_fixity(Arc::new(MapFixitySource { map: fixity }));
        }

        Ok(stage)
    }
}

/// Options controlling how a new version is built and applied
#[derive(Default)]
pub struct UpdateOptions {
    /// Spec version of the new inventory. Defaults to the object's current
    /// spec, or 1.1 for new objects. Downgrades are rejected.
    pub spec: Option<SpecVersion>,
    /// Version-number padding width for the first version of a new object
    pub padding: u32,
    /// Content directory name for the first version of a new object
    pub content_directory: Option<String>,
    /// Transform applied to new content paths
    pub content_path_fn: Option<Box<ContentPathFn>>,
    /// Worker pool width for the concurrent steps; 0 means the CPU count
    pub width: usize,
}

type StepFn = Box<dyn Fn(&Cancel) -> Result<()> + Send + Sync>;

/// One step of an update plan. The name is stable across rebuilds of the same
/// plan and identifies the step when a persisted plan is recovered.
pub struct PlanStep {
    name: String,
    concurrent: bool,
    complete: bool,
    err: Option<String>,
    revert_err: Option<String>,
    run: StepFn,
    revert: StepFn,
}

impl std::fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStep")
            .field("name", &self.name)
            .field("concurrent", &self.concurrent)
            .field("complete", &self.complete)
            .field("err", &self.err)
            .field("revert_err", &self.revert_err)
            .finish()
    }
}

impl PlanStep {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn err(&self) -> Option<&str> {
        self.err.as_deref()
    }

    pub fn revert_err(&self) -> Option<&str> {
        self.revert_err.as_deref()
    }
}

#[derive(Serialize, Deserialize)]
struct StepState {
    name: String,
    concurrent: bool,
    complete: bool,
    err: Option<String>,
    revert_err: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PlanState {
    format: u32,
    object_root: String,
    old_inventory: Option<String>,
    new_inventory: String,
    steps: Vec<StepState>,
}

const PLAN_FORMAT: u32 = 1;

/// An ordered, serialisable, resumable, revertible sequence of steps that
/// commits one new version to an object
pub struct UpdatePlan {
    object_root: String,
    old: Option<StoredInventory>,
    new: StoredInventory,
    steps: Vec<PlanStep>,
    width: usize,
}

impl std::fmt::Debug for UpdatePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePlan")
            .field("object_root", &self.object_root)
            .field("old", &self.old)
            .field("new", &self.new)
            .field("steps", &self.steps)
            .field("width", &self.width)
            .finish()
    }
}

/// Builds the plan that transforms the object at `object_root` from `old` to
/// `new_inventory`. Construction validates the transition and resolves every
/// new content digest; it performs no writes.
pub fn build_update_plan(
    fs: Arc<dyn WriteFs>,
    object_root: &str,
    old: Option<StoredInventory>,
    new_inventory: Inventory,
    content: Arc<dyn ContentSource>,
    width: usize,
) -> Result<UpdatePlan> {
    let new = new_inventory.to_stored()?;

    validate_transition(old.as_ref(), &new)?;

    for (digest, path) in new_content_paths(old.as_ref(), &new.inventory) {
        if content.resolve(&digest).is_none() {
            return Err(OcflError::IllegalArgument(format!(
                "The content source cannot provide {} for {}",
                digest, path
            )));
        }
    }

    let steps = build_steps(&fs, object_root, old.as_ref(), &new, &content)?;

    Ok(UpdatePlan {
        object_root: object_root.to_string(),
        old,
        new,
        steps,
        width: if width == 0 { default_width() } else { width },
    })
}

/// Reconstructs a plan from a blob produced by [`UpdatePlan::serialize`]. The
/// reconstructed steps must match the persisted ones by name or recovery is
/// refused. Completed steps are skipped when the plan is applied again.
pub fn recover_update_plan(
    blob: &[u8],
    fs: Arc<dyn WriteFs>,
    content: Arc<dyn ContentSource>,
    width: usize,
) -> Result<UpdatePlan> {
    let state: PlanState = serde_json::from_slice(blob)?;

    if state.format != PLAN_FORMAT {
        return Err(OcflError::IllegalState(format!(
            "Unsupported update plan format: {}",
            state.format
        )));
    }

    let old = state
        .old_inventory
        .map(|json| StoredInventory::parse(json.into_bytes()))
        .transpose()?;
    let new = StoredInventory::parse(state.new_inventory.into_bytes())?;

    validate_transition(old.as_ref(), &new)?;

    let mut steps = build_steps(&fs, &state.object_root, old.as_ref(), &new, &content)?;

    if steps.len() != state.steps.len() {
        return Err(OcflError::IllegalState(format!(
            "Refusing to resume update plan: expected {} steps but found {}",
            steps.len(),
            state.steps.len()
        )));
    }

    for (step, persisted) in steps.iter_mut().zip(state.steps) {
        if step.name != persisted.name || step.concurrent != persisted.concurrent {
            return Err(OcflError::IllegalState(format!(
                "Refusing to resume update plan: step {} does not match persisted step {}",
                step.name, persisted.name
            )));
        }

        step.complete = persisted.complete;
        step.err = persisted.err;
        step.revert_err = persisted.revert_err;
    }

    // Only the copies that still have to run need a resolvable source
    let incomplete: HashSet<&str> = steps
        .iter()
        .filter(|step| !step.complete)
        .map(|step| step.name.as_str())
        .collect();

    for (digest, path) in new_content_paths(old.as_ref(), &new.inventory) {
        if incomplete.contains(copy_step_name(&path).as_str()) && content.resolve(&digest).is_none()
        {
            return Err(OcflError::IllegalArgument(format!(
                "The content source cannot provide {} for {}",
                digest, path
            )));
        }
    }

    info!(
        "Recovered update plan for {} at {}",
        new.inventory.id, state.object_root
    );

    Ok(UpdatePlan {
        object_root: state.object_root,
        old,
        new,
        steps,
        width: if width == 0 { default_width() } else { width },
    })
}

impl UpdatePlan {
    /// The object root the plan writes into
    pub fn object_root(&self) -> &str {
        &self.object_root
    }

    /// The inventory the plan commits
    pub fn inventory(&self) -> &Inventory {
        &self.new.inventory
    }

    /// The plan's steps, in execution order
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// True once every step has completed
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|step| step.complete)
    }

    /// Runs the plan to completion. Already-complete steps are skipped, so
    /// applying a finished plan is a no-op and applying a partially-completed
    /// plan picks up where it stopped.
    pub fn apply(&mut self, cancel: &Cancel) -> Result<()> {
        while self.apply_next(cancel)? {}

        info!(
            "Committed {} {}",
            self.new.inventory.id, self.new.inventory.head
        );

        Ok(())
    }

    /// Runs the next pending step, or batch of adjacent concurrent steps.
    /// Returns false when there is nothing left to run.
    pub fn apply_next(&mut self, cancel: &Cancel) -> Result<bool> {
        cancel.check()?;

        let next = match self.steps.iter().position(|step| !step.complete) {
            Some(next) => next,
            None => return Ok(false),
        };

        if self.steps[next].concurrent {
            let end = next
                + self.steps[next..]
                    .iter()
                    .take_while(|step| step.concurrent)
                    .count();
            self.run_batch(next..end, cancel)?;
        } else {
            self.run_single(next, cancel)?;
        }

        Ok(true)
    }

    /// Walks the completed steps in reverse, undoing each. A first-version
    /// revert removes the object root entirely; otherwise the new version
    /// directory and sidecar are removed and the previous root inventory and
    /// sidecar are restored. Reverting is idempotent on not-exist.
    pub fn revert(&mut self, cancel: &Cancel) -> Result<()> {
        for idx in (0..self.steps.len()).rev() {
            if !self.steps[idx].complete && self.steps[idx].err.is_none() {
                continue;
            }

            cancel.check()?;

            match (self.steps[idx].revert)(cancel) {
                Ok(()) => {
                    self.steps[idx].complete = false;
                    self.steps[idx].err = None;
                    self.steps[idx].revert_err = None;
                }
                Err(e) if e.is_not_found() => {
                    self.steps[idx].complete = false;
                    self.steps[idx].err = None;
                    self.steps[idx].revert_err = None;
                }
                Err(e) => {
                    self.steps[idx].revert_err = Some(e.to_string());
                    error!("Failed to revert step '{}': {}", self.steps[idx].name, e);
                    return Err(e);
                }
            }
        }

        info!(
            "Reverted update of {} {}",
            self.new.inventory.id, self.new.inventory.head
        );

        Ok(())
    }

    /// Serialises the plan, including each step's completion state, into an
    /// opaque blob that can be persisted and later recovered.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let old_inventory = match &self.old {
            Some(old) => Some(String::from_utf8(old.bytes.clone()).map_err(|_| {
                OcflError::IllegalState("Inventory bytes are not valid UTF-8".to_string())
            })?),
            None => None,
        };
        let new_inventory = String::from_utf8(self.new.bytes.clone()).map_err(|_| {
            OcflError::IllegalState("Inventory bytes are not valid UTF-8".to_string())
        })?;

        let state = PlanState {
            format: PLAN_FORMAT,
            object_root: self.object_root.clone(),
            old_inventory,
            new_inventory,
            steps: self
                .steps
                .iter()
                .map(|step| StepState {
                    name: step.name.clone(),
                    concurrent: step.concurrent,
                    complete: step.complete,
                    err: step.err.clone(),
                    revert_err: step.revert_err.clone(),
                })
                .collect(),
        };

        Ok(serde_json::to_vec(&state)?)
    }

    fn run_single(&mut self, idx: usize, cancel: &Cancel) -> Result<()> {
        let result = (self.steps[idx].run)(cancel);

        match result {
            Ok(()) => {
                self.steps[idx].complete = true;
                self.steps[idx].err = None;
                Ok(())
            }
            Err(e) => {
                if !matches!(e, OcflError::Cancelled) {
                    self.steps[idx].err = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Runs the incomplete steps within the range on a bounded pool. The
    /// first failure cancels the remaining dispatches; steps that never ran
    /// stay incomplete with no recorded error.
    fn run_batch(&mut self, range: Range<usize>, cancel: &Cancel) -> Result<()> {
        let pending: Vec<usize> = range
            .filter(|idx| !self.steps[*idx].complete)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let width = self.width.min(pending.len()).max(1);
        let abort = Cancel::new();
        let steps = &self.steps;

        let results: Vec<(usize, Result<()>)> = thread::scope(|scope| {
            let (job_tx, job_rx) = unbounded::<usize>();
            let (result_tx, result_rx) = unbounded();

            for idx in &pending {
                // The receiver lives until the scope ends
                let _ = job_tx.send(*idx);
            }
            drop(job_tx);

            for _ in 0..width {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let abort = abort.clone();
                let caller = cancel.clone();

                scope.spawn(move || {
                    while let Ok(idx) = jobs.recv() {
                        if caller.is_cancelled() {
                            abort.cancel();
                        }

                        if abort.is_cancelled() {
                            let _ = results.send((idx, Err(OcflError::Cancelled)));
                            continue;
                        }

                        let result = (steps[idx].run)(&abort);

                        if result.is_err() {
                            abort.cancel();
                        }

                        let _ = results.send((idx, result));
                    }
                });
            }
            drop(result_tx);

            result_rx.iter().collect()
        });

        let mut first_err: Option<OcflError> = None;

        for (idx, result) in results {
            match result {
                Ok(()) => {
                    self.steps[idx].complete = true;
                    self.steps[idx].err = None;
                }
                Err(OcflError::Cancelled) => {
                    // Never ran; leave it incomplete for a future apply
                }
                Err(e) => {
                    self.steps[idx].err = Some(e.to_string());
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => cancel.check(),
        }
    }
}

/// Validates that `new` is a legal successor of `old`
fn validate_transition(old: Option<&StoredInventory>, new: &StoredInventory) -> Result<()> {
    let new_spec = new.inventory.spec_version().ok_or_else(|| {
        OcflError::IllegalArgument(format!(
            "Unrecognised inventory type: {}",
            new.inventory.type_declaration
        ))
    })?;

    let old = match old {
        Some(old) => old,
        None => {
            if new.inventory.head.number != 1 {
                return Err(OcflError::IllegalArgument(format!(
                    "The first version of an object must be v1. Found: {}",
                    new.inventory.head
                )));
            }
            return Ok(());
        }
    };

    let old_spec = old.inventory.spec_version().ok_or_else(|| {
        OcflError::IllegalArgument(format!(
            "Unrecognised inventory type: {}",
            old.inventory.type_declaration
        ))
    })?;

    if new_spec < old_spec {
        return Err(OcflError::IllegalArgument(format!(
            "The OCFL spec version cannot be downgraded from {} to {}",
            old_spec, new_spec
        )));
    }

    if new.inventory.id != old.inventory.id {
        return Err(OcflError::IllegalArgument(format!(
            "Object id {} does not match the existing object id {}",
            new.inventory.id, old.inventory.id
        )));
    }

    let expected_head = old.inventory.head.next()?;
    if new.inventory.head != expected_head
        || new.inventory.versions.len() != old.inventory.versions.len() + 1
    {
        return Err(OcflError::IllegalArgument(format!(
            "The new inventory must add exactly one version, {}. Found: {}",
            expected_head, new.inventory.head
        )));
    }

    if new.inventory.content_directory != old.inventory.content_directory {
        return Err(OcflError::IllegalArgument(
            "The content directory cannot change between versions".to_string(),
        ));
    }

    for (num, old_version) in &old.inventory.versions {
        match new.inventory.versions.get(num) {
            Some(new_version) if new_version.state() == old_version.state() => (),
            _ => {
                return Err(OcflError::IllegalArgument(format!(
                    "The new inventory changes the state of existing version {}",
                    num
                )));
            }
        }
    }

    Ok(())
}

/// The manifest entries present in `new` but not in `old`, sorted by path
fn new_content_paths(
    old: Option<&StoredInventory>,
    new: &Inventory,
) -> Vec<(Arc<HexDigest>, Arc<ContentPath>)> {
    let mut added = Vec::new();

    for (path, digest) in new.manifest().iter() {
        let existing = old
            .map(|old| old.inventory.manifest().contains_path(path))
            .unwrap_or(false);

        if !existing {
            added.push((digest.clone(), path.clone()));
        }
    }

    added.sort_by(|a, b| a.1.cmp(&b.1));
    added
}

fn copy_step_name(path: &ContentPath) -> String {
    format!("copy {}", path)
}

fn noop() -> StepFn {
    Box::new(|_| Ok(()))
}

/// Builds the step list. Shared by plan construction and recovery so that
/// recovered step names can be compared against the persisted ones.
fn build_steps(
    fs: &Arc<dyn WriteFs>,
    object_root: &str,
    old: Option<&StoredInventory>,
    new: &StoredInventory,
    content: &Arc<dyn ContentSource>,
) -> Result<Vec<PlanStep>> {
    let mut steps = Vec::new();

    let new_spec = new.inventory.spec_version().ok_or_else(|| {
        OcflError::IllegalArgument(format!(
            "Unrecognised inventory type: {}",
            new.inventory.type_declaration
        ))
    })?;
    let old_spec = old.and_then(|old| old.inventory.spec_version());

    let version_dir = paths::version_path(object_root, new.inventory.head);
    let algorithm = new.inventory.digest_algorithm;

    // 1. Root sentinel: a first-version revert removes the whole object root
    {
        let revert: StepFn = if old.is_none() {
            let fs = fs.clone();
            let root = object_root.to_string();
            Box::new(move |_| fs.remove_all(&root))
        } else {
            noop()
        };

        steps.push(PlanStep {
            name: "init object root".to_string(),
            concurrent: false,
            complete: false,
            err: None,
            revert_err: None,
            run: noop(),
            revert,
        });
    }

    // 2. Declaration writes, only when the spec changes
    if old_spec != Some(new_spec) {
        let namaste = new_spec.object_namaste();
        let path = paths::join(object_root, namaste.filename);

        {
            let fs_run = fs.clone();
            let fs_revert = fs.clone();
            let run_path = path.clone();
            let revert_path = path;

            steps.push(PlanStep {
                name: format!("write declaration {}", namaste.filename),
                concurrent: false,
                complete: false,
                err: None,
                revert_err: None,
                run: Box::new(move |cancel| {
                    cancel.check()?;
                    fs_run.write(&run_path, &mut namaste.content.as_bytes())?;
                    Ok(())
                }),
                revert: Box::new(move |_| fs_revert.remove(&revert_path)),
            });
        }

        if let Some(old_spec) = old_spec {
            let old_namaste = old_spec.object_namaste();
            let old_path = paths::join(object_root, old_namaste.filename);

            let fs_run = fs.clone();
            let fs_revert = fs.clone();
            let run_path = old_path.clone();
            let revert_path = old_path;

            steps.push(PlanStep {
                name: format!("remove declaration {}", old_namaste.filename),
                concurrent: false,
                complete: false,
                err: None,
                revert_err: None,
                run: Box::new(move |cancel| {
                    cancel.check()?;
                    fs_run.remove(&run_path)
                }),
                revert: Box::new(move |_| {
                    fs_revert.write(&revert_path, &mut old_namaste.content.as_bytes())?;
                    Ok(())
                }),
            });
        }
    }

    // 3. Version-directory sentinel: revert removes the new version wholesale
    {
        let fs = fs.clone();
        let dir = version_dir.clone();

        steps.push(PlanStep {
            name: format!("init version directory {}", new.inventory.head),
            concurrent: false,
            complete: false,
            err: None,
            revert_err: None,
            run: noop(),
            revert: Box::new(move |_| fs.remove_all(&dir)),
        });
    }

    // 4. Content copies, unordered among themselves
    for (digest, path) in new_content_paths(old, &new.inventory) {
        let dst = paths::join(object_root, path.as_str());

        let fs_run = fs.clone();
        let fs_revert = fs.clone();
        let content = content.clone();
        let run_digest = digest.clone();
        let run_dst = dst.clone();

        steps.push(PlanStep {
            name: copy_step_name(&path),
            concurrent: true,
            complete: false,
            err: None,
            revert_err: None,
            run: Box::new(move |cancel| {
                cancel.check()?;

                let (src_fs, src_path) = content.resolve(&run_digest).ok_or_else(|| {
                    OcflError::IllegalState(format!(
                        "No content source for digest {}",
                        run_digest
                    ))
                })?;

                // Re-applying after an interruption: a destination holding the
                // right bytes is left alone, anything else is a corruption
                match fs_run.open_file(&run_dst) {
                    Ok(mut existing) => {
                        let actual = algorithm.hash_hex(&mut existing)?;
                        return if actual == *run_digest {
                            Ok(())
                        } else {
                            Err(OcflError::DigestMismatch {
                                algorithm,
                                path: run_dst.clone(),
                                expected: run_digest.to_string(),
                                actual: actual.to_string(),
                            })
                        };
                    }
                    Err(e) if e.is_not_found() => (),
                    Err(e) => return Err(e),
                }

                let src_reader = src_fs.open_file(&src_path)?;
                let mut reader = algorithm.reader(src_reader);
                fs_run.write(&run_dst, &mut reader)?;

                let actual = reader.finalize_hex();
                if actual != *run_digest {
                    if let Err(e) = fs_run.remove(&run_dst) {
                        error!("Failed to remove {}: {}", run_dst, e);
                    }
                    return Err(OcflError::DigestMismatch {
                        algorithm,
                        path: run_dst.clone(),
                        expected: run_digest.to_string(),
                        actual: actual.to_string(),
                    });
                }

                Ok(())
            }),
            revert: Box::new(move |_| fs_revert.remove(&dst)),
        });
    }

    // 5/6. Version-directory inventory and sidecar
    push_write_step(
        &mut steps,
        fs,
        format!("write {}/inventory.json", new.inventory.head),
        paths::inventory_path(&version_dir),
        new.bytes.clone(),
    );
    push_write_step(
        &mut steps,
        fs,
        format!(
            "write {}/{}",
            new.inventory.head,
            paths::sidecar_name(algorithm)
        ),
        paths::sidecar_path(&version_dir, algorithm),
        sidecar_line(&new.digest).into_bytes(),
    );

    // 7. Root inventory; revert restores the previous one
    {
        let fs_run = fs.clone();
        let fs_revert = fs.clone();
        let root_inventory = paths::inventory_path(object_root);
        let run_path = root_inventory.clone();
        let bytes = new.bytes.clone();

        let revert: StepFn = match old {
            Some(old) => {
                let prev_inventory =
                    paths::inventory_path(&paths::version_path(object_root, old.inventory.head));
                let old_bytes = old.bytes.clone();

                Box::new(move |_| {
                    // The previous version directory holds a byte-identical
                    // copy; fall back to the bytes saved in the plan
                    match fs_revert.open_file(&prev_inventory) {
                        Ok(mut reader) => {
                            fs_revert.write(&root_inventory, &mut *reader)?;
                        }
                        Err(e) if e.is_not_found() => {
                            fs_revert.write(&root_inventory, &mut old_bytes.as_slice())?;
                        }
                        Err(e) => return Err(e),
                    }
                    Ok(())
                })
            }
            None => {
                let root_inventory = root_inventory.clone();
                Box::new(move |_| fs_revert.remove(&root_inventory))
            }
        };

        steps.push(PlanStep {
            name: "write root inventory.json".to_string(),
            concurrent: false,
            complete: false,
            err: None,
            revert_err: None,
            run: Box::new(move |cancel| {
                cancel.check()?;
                fs_run.write(&run_path, &mut bytes.as_slice())?;
                Ok(())
            }),
            revert,
        });
    }

    // 8. Root sidecar: the commit point
    {
        let fs_run = fs.clone();
        let fs_revert = fs.clone();
        let sidecar = paths::sidecar_path(object_root, algorithm);
        let run_sidecar = sidecar.clone();
        let line = sidecar_line(&new.digest).into_bytes();

        let old_sidecar = old.map(|old| {
            (
                paths::sidecar_path(object_root, old.inventory.digest_algorithm),
                sidecar_line(&old.digest).into_bytes(),
            )
        });
        let run_old_sidecar = old_sidecar.clone();

        steps.push(PlanStep {
            name: format!("write root {}", paths::sidecar_name(algorithm)),
            concurrent: false,
            complete: false,
            err: None,
            revert_err: None,
            run: Box::new(move |cancel| {
                cancel.check()?;
                fs_run.write(&run_sidecar, &mut line.as_slice())?;

                // An algorithm change leaves a stale sidecar behind
                if let Some((old_path, _)) = &run_old_sidecar {
                    if old_path != &run_sidecar {
                        fs_run.remove(old_path)?;
                    }
                }

                Ok(())
            }),
            revert: Box::new(move |_| {
                match &old_sidecar {
                    Some((old_path, old_line)) => {
                        if old_path != &sidecar {
                            fs_revert.remove(&sidecar)?;
                        }
                        fs_revert.write(old_path, &mut old_line.as_slice())?;
                    }
                    None => fs_revert.remove(&sidecar)?,
                }
                Ok(())
            }),
        });
    }

    Ok(steps)
}

fn push_write_step(
    steps: &mut Vec<PlanStep>,
    fs: &Arc<dyn WriteFs>,
    name: String,
    path: String,
    bytes: Vec<u8>,
) {
    let fs_run = fs.clone();
    let fs_revert = fs.clone();
    let run_path = path.clone();

    steps.push(PlanStep {
        name,
        concurrent: false,
        complete: false,
        err: None,
        revert_err: None,
        run: Box::new(move |cancel| {
            cancel.check()?;
            fs_run.write(&run_path, &mut bytes.as_slice())?;
            Ok(())
        }),
        revert: Box::new(move |_| fs_revert.remove(&path)),
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ContentSource, Stage};
    use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
    use crate::ocfl::fs::{Cancel, Fs, LocalFs, WriteFs};
    use tempfile::TempDir;

    #[test]
    fn stage_a_directory() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new(temp.path()).unwrap();

        fs.write("stage/hello.csv", &mut "a,b\n1,2\n".as_bytes())
            .unwrap();
        fs.write("stage/folder/file.txt", &mut "hi\n".as_bytes())
            .unwrap();

        let fs: Arc<LocalFs> = Arc::new(fs);

        let stage = Stage::of_dir(
            fs.clone(),
            "stage",
            DigestAlgorithm::Sha512,
            &[DigestAlgorithm::Md5],
            2,
            &Cancel::new(),
        )
        .unwrap();

        assert_eq!(2, stage.state.len());

        let digest = stage
            .state
            .digest_for(&"hello.csv".try_into().unwrap())
            .unwrap()
            .clone();

        let (src_fs, src_path) = stage.content.resolve(&digest).unwrap();
        assert_eq!("stage/hello.csv", src_path);

        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut src_fs.open_file(&src_path).unwrap(), &mut bytes)
            .unwrap();
        assert_eq!(b"a,b\n1,2\n".to_vec(), bytes);

        let fixity = stage.fixity.as_ref().unwrap().fixity(&digest);
        assert!(fixity.contains_key(&DigestAlgorithm::Md5));
    }

    #[test]
    fn unresolvable_stage_content_fails_construction() {
        struct Empty;
        impl ContentSource for Empty {
            fn resolve(&self, _digest: &HexDigest) -> Option<(Arc<dyn Fs>, String)> {
                None
            }
        }

        let temp = TempDir::new().unwrap();
        let fs: Arc<LocalFs> = Arc::new(LocalFs::new(temp.path()).unwrap());

        let mut state = crate::ocfl::digest_map::DigestMap::new();
        state
            .insert("abc123".into(), "file.txt".try_into().unwrap())
            .unwrap();

        let inventory = crate::ocfl::inventory::Inventory::builder()
            .with_id("urn:example:1")
            .with_version(state, DigestAlgorithm::Sha512)
            .finalize()
            .unwrap();

        let err = super::build_update_plan(
            fs,
            "obj",
            None,
            inventory,
            Arc::new(Empty),
            1,
        )
        .unwrap_err();

        assert!(err.to_string().contains("content source"));
    }
}
