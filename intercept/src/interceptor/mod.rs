use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use swizzle_runtime::{Class, Imp, Method, Sel};

use crate::config::HookConfig;
use crate::interceptor::context::{HookContext, State};
use crate::interceptor::dispatch::fatal;
use crate::interceptor::inherit::SuperForwarder;
use crate::interceptor::replacement::Replacement;
use crate::types::{HookError, HookMode, Result};

mod context;
mod dispatch;
mod inherit;
pub mod invocation;
pub mod replacement;

static CONFIG: OnceLock<HookConfig> = OnceLock::new();

/// Fixes the configuration before the interceptor is first used.
/// Returns false if a configuration was already in effect.
pub(crate) fn configure(config: HookConfig) -> bool {
    CONFIG.set(config).is_ok()
}

type ChainKey = (usize, Sel);

/// Bookkeeping for one (class, selector).
#[derive(Default)]
struct Chain {
    /// The method whose slot the hooks live in. Fixed by the first install.
    method: Option<Arc<Method>>,
    /// Installed hooks in install order.
    contexts: Vec<Arc<HookContext>>,
    /// Cancelled hooks whose trampolines are still referenced from outside
    /// the chain. They pass calls straight through to `next`.
    retired: Vec<Arc<HookContext>>,
    /// Implementation of a method copied down from the superclass. Lives as
    /// long as the copied method, i.e. for the process.
    inherited: Option<SuperForwarder>,
}

/// Who points at a trampoline.
enum Referent<'a> {
    Slot,
    Context(&'a Arc<HookContext>),
}

impl Chain {
    fn all(&self) -> impl Iterator<Item = &Arc<HookContext>> {
        self.contexts.iter().chain(self.retired.iter())
    }

    fn referents(&self, method: &Method, target: &Arc<HookContext>) -> Vec<Referent<'_>> {
        let code = target.code();
        let mut found = Vec::new();
        if method.implementation() == code {
            found.push(Referent::Slot);
        }
        found.extend(
            self.all()
                .filter(|c| !Arc::ptr_eq(c, target) && c.next() == Some(code))
                .map(Referent::Context),
        );
        found
    }

    /// Routes whatever calls `target`'s trampoline around it.
    ///
    /// Returns false when nothing in the chain refers to it: some layer
    /// outside the chain captured the trampoline and will keep calling it.
    fn unlink(&self, method: &Method, target: &Arc<HookContext>) -> bool {
        let code = target.code();
        let Some(next) = target.next() else {
            fatal("cancelling a hook that was never installed");
        };
        let referents = self.referents(method, target);
        match referents.as_slice() {
            [] => false,
            [Referent::Slot] => method.compare_exchange_implementation(code, next).is_ok(),
            [Referent::Context(outer)] => {
                if !outer.relink(code, next) {
                    fatal("hook chain link changed while the chain was locked");
                }
                true
            }
            _ => fatal(&format!(
                "{} referents for trampoline {:?} of -[{} {}]",
                referents.len(),
                code,
                target.class().name(),
                target.selector()
            )),
        }
    }

    /// Unlinks retired hooks that only the chain refers to again.
    fn sweep(&mut self, method: &Method) -> Vec<Arc<HookContext>> {
        let mut released = Vec::new();
        loop {
            let Some(index) = self.retired.iter().position(|r| self.referents(method, r).len() == 1) else {
                break;
            };
            if !self.unlink(method, &self.retired[index]) {
                break;
            }
            released.push(self.retired.remove(index));
        }
        released
    }
}

/// Releases contexts once no thread can still be running their trampolines.
fn release(contexts: Vec<Arc<HookContext>>) {
    if contexts.is_empty() {
        return;
    }
    let guard = crossbeam_epoch::pin();
    for context in contexts {
        guard.defer(move || drop(context));
    }
    guard.flush();
}

/// Process-wide hook registry.
pub struct Interceptor {
    chains: DashMap<ChainKey, Arc<Mutex<Chain>>>,
    next_id: AtomicU64,
    config: HookConfig,
}

impl Interceptor {
    pub fn obtain() -> &'static Interceptor {
        static INSTANCE: OnceLock<Interceptor> = OnceLock::new();
        INSTANCE.get_or_init(|| Interceptor {
            chains: DashMap::new(),
            next_id: AtomicU64::new(1),
            config: CONFIG.get_or_init(HookConfig::from_env).clone(),
        })
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    fn key(class: &'static Class, selector: Sel) -> ChainKey {
        (class as *const Class as usize, selector)
    }

    fn chain(&self, class: &'static Class, selector: Sel) -> Arc<Mutex<Chain>> {
        self.chains
            .entry(Self::key(class, selector))
            .or_insert_with(|| Arc::new(Mutex::new(Chain::default())))
            .value()
            .clone()
    }

    fn existing_chain(&self, class: &'static Class, selector: Sel) -> Option<Arc<Mutex<Chain>>> {
        self.chains.get(&Self::key(class, selector)).map(|c| c.value().clone())
    }

    /// Installs `replacement` on `class`'s implementation of `selector`.
    ///
    /// Hooks on the same method compose: the most recent install runs
    /// outermost, and each hook's "original" is the hook installed before it.
    pub fn hook(
        &self,
        class: &'static Class,
        selector: Sel,
        mode: HookMode,
        replacement: Replacement,
    ) -> Result<HookToken> {
        let chain = self.chain(class, selector);
        let mut chain = chain.lock();

        let (method, inherited) = match class.own_method(selector) {
            Some(method) => (method, false),
            None => match class.instance_method(selector) {
                Some(method) if self.config.inherit_methods => (method, true),
                _ => {
                    return Err(HookError::SelectorNotFound {
                        class: class.name().to_owned(),
                        selector: selector.name().to_owned(),
                    })
                }
            },
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let context = HookContext::prepare(
            id,
            class,
            &method,
            mode,
            Arc::new(replacement),
            self.config.trace_dispatch,
        )?;

        let method = match class.superclass() {
            Some(superclass) if inherited => {
                // Hook preparation succeeded; give the class its own method
                // so the superclass keeps its implementation.
                let forwarder = SuperForwarder::new(superclass, &method)?;
                let encoding = method.type_encoding().unwrap_or_default();
                unsafe { class.add_method(selector, forwarder.code(), encoding) };
                chain.inherited = Some(forwarder);
                class.own_method(selector).ok_or_else(|| HookError::SelectorNotFound {
                    class: class.name().to_owned(),
                    selector: selector.name().to_owned(),
                })?
            }
            _ => method,
        };

        let released = chain.sweep(&method);
        let displaced = context.install(&method);
        log::debug!(
            "installed {mode} hook #{id} on -[{} {selector}] over {displaced:?}{}",
            class.name(),
            if inherited { " (copied down from superclass)" } else { "" }
        );
        chain.method.get_or_insert_with(|| method.clone());
        chain.contexts.push(context.clone());
        drop(chain);
        release(released);

        Ok(HookToken::new(&context))
    }

    /// Removes a hook. True only for the call that actually cancelled it.
    pub fn cancel(&self, token: &HookToken) -> bool {
        let Some(chain) = self.existing_chain(token.class, token.selector) else {
            return false;
        };
        let mut chain = chain.lock();
        // Released contexts are long gone from the chain.
        let Some(context) = token.context.upgrade() else {
            return false;
        };
        if !context.mark_cancelled() {
            return false;
        }
        let index = chain.contexts.iter().position(|c| Arc::ptr_eq(c, &context));
        drop(context);
        let Some(index) = index else {
            fatal("cancelled hook is missing from its chain");
        };
        let Some(method) = chain.method.clone() else {
            fatal("hook chain has contexts but no method");
        };

        let cancelled = chain.contexts.remove(index);
        let mut released = Vec::new();
        if chain.unlink(&method, &cancelled) {
            log::debug!(
                "cancelled {} hook #{} on -[{} {}]",
                cancelled.mode(),
                cancelled.id(),
                cancelled.class().name(),
                cancelled.selector()
            );
            released.push(cancelled);
        } else {
            log::warn!(
                "hook #{} on -[{} {}] is wrapped by an external layer; keeping it as a pass-through",
                cancelled.id(),
                cancelled.class().name(),
                cancelled.selector()
            );
            chain.retired.push(cancelled);
        }
        released.extend(chain.sweep(&method));
        drop(chain);
        release(released);
        true
    }

    /// Whether `class`'s current implementation of `selector` is one of our
    /// trampolines.
    pub fn is_hooked(&self, class: &'static Class, selector: Sel) -> bool {
        let Some(chain) = self.existing_chain(class, selector) else {
            return false;
        };
        let chain = chain.lock();
        let Some(method) = chain.method.as_ref() else {
            return false;
        };
        let current = method.implementation();
        let hooked = chain.all().any(|c| c.code() == current);
        hooked
    }

    /// Number of active hooks on `class`'s implementation of `selector`.
    pub fn hook_count(&self, class: &'static Class, selector: Sel) -> usize {
        self.existing_chain(class, selector).map_or(0, |chain| {
            let count = chain.lock().contexts.len();
            count
        })
    }

    /// Current state of every chain that ever had a hook installed.
    pub fn snapshot(&self) -> Vec<ChainInfo> {
        let chains: Vec<Arc<Mutex<Chain>>> = self.chains.iter().map(|e| e.value().clone()).collect();
        let mut infos: Vec<ChainInfo> = chains
            .iter()
            .filter_map(|chain| {
                let chain = chain.lock();
                let method = chain.method.as_ref()?;
                let first = chain.all().next()?;
                let current = method.implementation();
                let hooked = chain.all().any(|c| c.code() == current);
                let info = ChainInfo {
                    class: first.class().name().to_owned(),
                    selector: first.selector().name().to_owned(),
                    hooks: chain
                        .contexts
                        .iter()
                        .map(|c| HookInfo {
                            id: c.id(),
                            mode: c.mode(),
                        })
                        .collect(),
                    retired: chain.retired.len(),
                    hooked,
                };
                Some(info)
            })
            .collect();
        infos.sort_by(|a, b| (&a.class, &a.selector).cmp(&(&b.class, &b.selector)));
        infos
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookInfo {
    pub id: u64,
    pub mode: HookMode,
}

/// Diagnostic view of one hooked method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub class: String,
    pub selector: String,
    /// Active hooks, innermost first.
    pub hooks: Vec<HookInfo>,
    /// Cancelled hooks kept alive as pass-throughs.
    pub retired: usize,
    /// Whether the method slot currently holds one of our trampolines.
    pub hooked: bool,
}

/// Handle to one installed hook. Only good for cancelling it.
///
/// The token does not keep the hook alive: once cancelled and unlinked, the
/// context and its trampolines are reclaimed even while tokens remain.
#[derive(Clone)]
pub struct HookToken {
    context: Weak<HookContext>,
    id: u64,
    mode: HookMode,
    class: &'static Class,
    selector: Sel,
    code: Imp,
}

impl HookToken {
    fn new(context: &Arc<HookContext>) -> Self {
        Self {
            context: Arc::downgrade(context),
            id: context.id(),
            mode: context.mode(),
            class: context.class(),
            selector: context.selector(),
            code: context.code(),
        }
    }

    pub fn cancel(&self) -> bool {
        Interceptor::obtain().cancel(self)
    }

    pub fn is_cancelled(&self) -> bool {
        self.context
            .upgrade()
            .map_or(true, |context| context.state() == State::Cancelled)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> HookMode {
        self.mode
    }

    pub fn class(&self) -> &'static Class {
        self.class
    }

    pub fn selector(&self) -> Sel {
        self.selector
    }

    /// The trampoline address this hook installs. Dangling once the hook is
    /// cancelled and released.
    pub fn code(&self) -> Imp {
        self.code
    }
}

impl fmt::Debug for HookToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookToken")
            .field("id", &self.id())
            .field("mode", &self.mode())
            .field("class", &self.class().name())
            .field("selector", &self.selector())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
