// Session lock bookkeeping on top of a session store

pub mod locks;

// Re-export main types
pub use locks::SessionLocks;
