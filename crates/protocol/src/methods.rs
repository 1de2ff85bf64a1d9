//! Method and event names used on the inspector wire.

pub const DEBUGGER_ENABLE: &str = "Debugger.enable";
pub const DEBUGGER_RESUME: &str = "Debugger.resume";
pub const DEBUGGER_STEP_OVER: &str = "Debugger.stepOver";
pub const DEBUGGER_STEP_INTO: &str = "Debugger.stepInto";
pub const DEBUGGER_SET_BREAKPOINT_BY_URL: &str = "Debugger.setBreakpointByUrl";
pub const DEBUGGER_GET_SCRIPT_SOURCE: &str = "Debugger.getScriptSource";

pub const RUNTIME_ENABLE: &str = "Runtime.enable";
pub const RUNTIME_GET_PROPERTIES: &str = "Runtime.getProperties";
pub const RUNTIME_RUN_IF_WAITING: &str = "Runtime.runIfWaitingForDebugger";

pub const EVENT_PAUSED: &str = "Debugger.paused";
pub const EVENT_RESUMED: &str = "Debugger.resumed";
pub const EVENT_SCRIPT_PARSED: &str = "Debugger.scriptParsed";
pub const EVENT_CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";
pub const EVENT_EXCEPTION_THROWN: &str = "Runtime.exceptionThrown";
pub const EVENT_CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
