//! Priority-ordered callbacks between plugins.
//!
//! Plugins publish priority constants; a plugin that needs another one's
//! results registers a callback with a higher priority. Equal priorities run
//! in declaration order (plugin order, then the order a plugin lists them).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackInfo {
    pub priority: i32,
    /// Passed back to [`crate::plugin::Plugin::run_callback`].
    pub id: usize,
    pub name: &'static str,
}

impl CallbackInfo {
    pub const fn new(priority: i32, id: usize, name: &'static str) -> Self {
        Self { priority, id, name }
    }
}

/// A callback bound to the plugin that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCallback {
    pub plugin: usize,
    pub info: CallbackInfo,
}

/// Flattens declared callbacks and sorts them by ascending priority.
pub fn schedule_callbacks<I>(declared: I) -> Vec<ScheduledCallback>
where
    I: IntoIterator<Item = (usize, Vec<CallbackInfo>)>,
{
    let mut scheduled: Vec<ScheduledCallback> = declared
        .into_iter()
        .flat_map(|(plugin, infos)| {
            infos
                .into_iter()
                .map(move |info| ScheduledCallback { plugin, info })
        })
        .collect();
    // slice::sort_by_key is stable
    scheduled.sort_by_key(|c| c.info.priority);
    scheduled
}
