/// Progress notifications streamed from a running audit to an observer.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        base_url: String,
    },
    /// Discovery finished (or the custom page list was resolved).
    PagesDiscovered {
        count: usize,
    },
    PageStarted {
        url: String,
        index: usize,
        total: usize,
    },
    PageCompleted {
        url: String,
        issues: usize,
    },
    PageFailed {
        url: String,
        error: String,
    },
    RunCompleted {
        pages_processed: u32,
        issues_created: u32,
        duration_ms: u64,
    },
    RunFailed {
        error: String,
    },
}
