//! C ABI for hosting the client inside a native instrumentation framework.
//!
//! The host loads this library, hands [`icount_client_init`] its argument
//! vector and a [`CctCallbacks`] table pointing into the calling-context
//! service, inserts a call to [`icount_ins_count`] before every instrumented
//! instruction and calls [`icount_client_exit`] at process exit.
//!
//! # Safety
//!
//! The host must ensure:
//! - `callbacks` outlives the client and its function pointers are safe to
//!   call from any application thread
//! - the client pointer returned by init is passed to exit exactly once and
//!   not used afterwards

use std::ffi::{CStr, c_char, c_int, c_void};
use std::process;

use icount_report::{BacktraceRenderer, BacktraceRequest};
use icount_state::{CategoryFlags, ContextHandle};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::client::{Client, InstrumentedSite};
use crate::config::{ClientConfig, DEFAULT_CLIENT_NAME};
use crate::context::{ContextProvider, SiteSlot};
use crate::error::{Error, Result};

/// Initial backtrace buffer size; grown when the service needs more.
const BACKTRACE_BUF_SIZE: usize = 4096;

type GetContextHandleFn = unsafe extern "C" fn(*mut c_void, *mut c_void, i32) -> u32;
type GetMaxContextHandleFn = unsafe extern "C" fn(*mut c_void) -> u32;

/// Renders a backtrace into `buf` (at most `len` bytes, NUL-terminated when
/// room allows) and returns the full length the text needs, excluding the NUL.
type PrintBacktraceFn =
    unsafe extern "C" fn(*mut c_void, u32, u32, bool, bool, *mut c_char, usize) -> usize;

/// Calling-context service entry points.
///
/// Matches this C layout:
/// ```c
/// typedef struct CctCallbacks {
///     void* context;
///     uint32_t (*get_context_handle)(void* context, void* drcontext, int32_t slot);
///     uint32_t (*get_max_context_handle)(void* context);
///     size_t (*print_backtrace)(void* context, uint32_t handle, uint32_t max_depth,
///                               bool own_frame, bool caller_frames,
///                               char* buf, size_t len);
/// } CctCallbacks;
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CctCallbacks {
    pub context: *mut c_void,
    pub get_context_handle: Option<GetContextHandleFn>,
    pub get_max_context_handle: Option<GetMaxContextHandleFn>,
    pub print_backtrace: Option<PrintBacktraceFn>,
}

/// [`ContextProvider`] and [`BacktraceRenderer`] backed by C callbacks.
pub struct FfiProvider {
    context: *mut c_void,
    get_context_handle: GetContextHandleFn,
    get_max_context_handle: GetMaxContextHandleFn,
    print_backtrace: PrintBacktraceFn,
}

// SAFETY: the host guarantees the callbacks and their context are usable
// from every application thread.
unsafe impl Send for FfiProvider {}
unsafe impl Sync for FfiProvider {}

impl FfiProvider {
    /// # Errors
    ///
    /// Returns [`Error::MissingCallback`] naming the first null entry.
    pub fn new(callbacks: &CctCallbacks) -> Result<Self> {
        Ok(Self {
            context: callbacks.context,
            get_context_handle: callbacks
                .get_context_handle
                .ok_or(Error::MissingCallback("get_context_handle"))?,
            get_max_context_handle: callbacks
                .get_max_context_handle
                .ok_or(Error::MissingCallback("get_max_context_handle"))?,
            print_backtrace: callbacks
                .print_backtrace
                .ok_or(Error::MissingCallback("print_backtrace"))?,
        })
    }

    fn print_into(
        &self,
        handle: ContextHandle,
        request: BacktraceRequest,
        buf: &mut [u8],
    ) -> usize {
        unsafe {
            (self.print_backtrace)(
                self.context,
                handle,
                request.max_depth,
                request.include_own_frame,
                request.include_caller_frames,
                buf.as_mut_ptr().cast::<c_char>(),
                buf.len(),
            )
        }
    }
}

impl ContextProvider for FfiProvider {
    /// The framework's per-thread context pointer.
    type Thread = *mut c_void;

    #[inline]
    fn current_handle(&self, thread: &Self::Thread, slot: SiteSlot) -> ContextHandle {
        unsafe { (self.get_context_handle)(self.context, *thread, slot) }
    }

    fn max_handle(&self) -> ContextHandle {
        unsafe { (self.get_max_context_handle)(self.context) }
    }
}

impl BacktraceRenderer for FfiProvider {
    fn render(&self, handle: ContextHandle, request: BacktraceRequest) -> String {
        let mut buf = vec![0u8; BACKTRACE_BUF_SIZE];
        let mut needed = self.print_into(handle, request, &mut buf);
        if needed >= buf.len() {
            buf.resize(needed + 1, 0);
            needed = self.print_into(handle, request, &mut buf);
        }
        buf.truncate(needed.min(buf.len()));
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Client type handed across the C ABI.
pub type IcountClient = Client<FfiProvider>;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("icount=info"));
    // A host that already installed a subscriber keeps it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Copy the C argument vector, falling back to the client name alone.
#[allow(clippy::similar_names)]
unsafe fn collect_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    let count = usize::try_from(argc).unwrap_or(0);
    if argv.is_null() || count == 0 {
        return vec![DEFAULT_CLIENT_NAME.to_string()];
    }
    (0..count)
        .map(|i| unsafe { *argv.add(i) })
        .filter(|arg| !arg.is_null())
        .map(|arg| unsafe { CStr::from_ptr(arg) })
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[allow(clippy::similar_names)]
unsafe fn init_client(
    argc: c_int,
    argv: *const *const c_char,
    callbacks: *const CctCallbacks,
) -> Result<IcountClient> {
    let args = unsafe { collect_args(argc, argv) };
    let config = ClientConfig::from_args(args)?;
    let callbacks = unsafe { callbacks.as_ref() }.ok_or(Error::MissingCallback("callbacks"))?;
    let provider = FfiProvider::new(callbacks)?;
    Client::init(config, provider)
}

fn fatal_message(err: &Error) -> String {
    format!("{DEFAULT_CLIENT_NAME}: {err}")
}

/// Log the diagnostic, repeat it on stderr and exit with status 1.
///
/// The direct stderr write survives a host subscriber that filters or
/// redirects this crate's events.
fn fatal(err: &Error) -> ! {
    let message = fatal_message(err);
    error!("{message}");
    eprintln!("{message}");
    process::exit(1)
}

/// Create the client: open the report file and allocate the counters.
///
/// Any failure is fatal: the diagnostic is logged, written to stderr, and
/// the process exits with status 1.
///
/// # Safety
///
/// `argv` must be null or point to `argc` pointers, each null or a valid
/// NUL-terminated string. `callbacks` must be null or point to a valid
/// [`CctCallbacks`] that outlives the returned client.
#[unsafe(no_mangle)]
#[allow(clippy::similar_names)]
pub unsafe extern "C" fn icount_client_init(
    argc: c_int,
    argv: *const *const c_char,
    callbacks: *const CctCallbacks,
) -> *mut IcountClient {
    init_logging();
    crate::metrics::init();
    match unsafe { init_client(argc, argv, callbacks) } {
        Ok(client) => Box::into_raw(Box::new(client)),
        Err(err) => fatal(&err),
    }
}

#[cfg(feature = "bounds-check")]
unsafe fn count_site(client: &IcountClient, drcontext: *mut c_void, site: InstrumentedSite) {
    if let Err(err) = client.try_on_execute(&drcontext, site) {
        fatal(&err);
    }
}

#[cfg(not(feature = "bounds-check"))]
unsafe fn count_site(client: &IcountClient, drcontext: *mut c_void, site: InstrumentedSite) {
    unsafe { client.on_execute_unchecked(&drcontext, site) };
}

/// Count one execution of the instruction at `slot` under the calling
/// context of `drcontext`.
///
/// # Safety
///
/// `client` must be null or a live pointer returned by
/// [`icount_client_init`]. Without the `bounds-check` feature the handle the
/// service returns for `drcontext` must be below the configured capacity.
#[unsafe(no_mangle)]
#[allow(clippy::similar_names)]
pub unsafe extern "C" fn icount_ins_count(
    client: *const IcountClient,
    drcontext: *mut c_void,
    slot: i32,
    is_ubr: bool,
    is_cbr: bool,
    is_str: bool,
    is_ld: bool,
) {
    unsafe {
        if let Some(client) = client.as_ref() {
            let flags = CategoryFlags::from_bools(is_ubr, is_cbr, is_str, is_ld);
            count_site(client, drcontext, client.instrument(slot, flags));
        }
    }
}

/// Write the report and free the client.
///
/// Returns 0 on success, -1 for a null client or a failed report.
///
/// # Safety
///
/// `client` must be null or a pointer returned by [`icount_client_init`]
/// that has not been passed here before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn icount_client_exit(client: *mut IcountClient) -> c_int {
    if client.is_null() {
        return -1;
    }
    let client = unsafe { Box::from_raw(client) };
    match client.exit() {
        Ok(_) => 0,
        Err(err) => {
            error!("{}", fatal_message(&err));
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::fs;
    use std::ptr;

    /// Service state behind the `context` pointer.
    struct FakeService {
        max: u32,
        frame_len: usize,
    }

    impl FakeService {
        const fn new(max: u32) -> Self {
            Self { max, frame_len: 0 }
        }
    }

    /// Thread context pointer carries the handle directly.
    unsafe extern "C" fn fake_handle(_ctx: *mut c_void, drcontext: *mut c_void, _slot: i32) -> u32 {
        u32::try_from(drcontext.addr()).unwrap_or(u32::MAX)
    }

    unsafe extern "C" fn fake_max(ctx: *mut c_void) -> u32 {
        unsafe { (*ctx.cast::<FakeService>()).max }
    }

    unsafe extern "C" fn fake_backtrace(
        ctx: *mut c_void,
        handle: u32,
        max_depth: u32,
        _own: bool,
        _callers: bool,
        buf: *mut c_char,
        len: usize,
    ) -> usize {
        let service = unsafe { &*ctx.cast::<FakeService>() };
        let mut text = format!("ctx {handle} depth {max_depth}");
        while text.len() < service.frame_len {
            text.push('.');
        }
        text.push('\n');
        let bytes = text.as_bytes();
        if len > 0 {
            let n = bytes.len().min(len - 1);
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), n);
                *buf.add(n) = 0;
            }
        }
        bytes.len()
    }

    const fn callbacks(service: &mut FakeService) -> CctCallbacks {
        CctCallbacks {
            context: ptr::from_mut(service).cast(),
            get_context_handle: Some(fake_handle),
            get_max_context_handle: Some(fake_max),
            print_backtrace: Some(fake_backtrace),
        }
    }

    const fn thread(handle: usize) -> *mut c_void {
        ptr::without_provenance_mut(handle)
    }

    #[test]
    fn test_provider_rejects_missing_callback() {
        let mut service = FakeService::new(0);
        let mut table = callbacks(&mut service);
        table.print_backtrace = None;
        let Err(err) = FfiProvider::new(&table) else {
            panic!("missing callback should fail");
        };
        assert!(matches!(err, Error::MissingCallback("print_backtrace")));
    }

    #[test]
    fn test_provider_forwards_calls() {
        let mut service = FakeService::new(42);
        let provider = FfiProvider::new(&callbacks(&mut service)).expect("provider");
        assert_eq!(provider.max_handle(), 42);
        assert_eq!(provider.current_handle(&thread(7), 0), 7);
        assert_eq!(
            provider.render(7, BacktraceRequest::with_depth(10)),
            "ctx 7 depth 10\n"
        );
    }

    #[test]
    fn test_render_grows_buffer() {
        let mut service = FakeService {
            max: 1,
            frame_len: BACKTRACE_BUF_SIZE * 2,
        };
        let provider = FfiProvider::new(&callbacks(&mut service)).expect("provider");
        let text = provider.render(3, BacktraceRequest::default());
        assert_eq!(text.len(), BACKTRACE_BUF_SIZE * 2 + 1);
        assert!(text.starts_with("ctx 3 depth 10"));
        assert!(text.ends_with(".\n"));
    }

    #[test]
    fn test_collect_args_fallback() {
        let args = unsafe { collect_args(0, ptr::null()) };
        assert_eq!(args, [DEFAULT_CLIENT_NAME]);
    }

    #[test]
    fn test_fatal_message_names_failed_array() {
        let Err(err) = icount_state::CounterStore::allocate(0) else {
            panic!("zero capacity should fail");
        };
        let message = fatal_message(&Error::from(err));
        assert!(message.starts_with("instr_analysis: "));
        assert!(message.contains("aggregate counter array"));
    }

    #[cfg(feature = "bounds-check")]
    #[test]
    fn test_bounds_checked_counting() {
        use icount_state::Category;

        let dir = tempfile::tempdir().expect("tempdir");
        let mut service = FakeService::new(4);
        let provider = FfiProvider::new(&callbacks(&mut service)).expect("provider");
        let config = ClientConfig::new(dir.path()).with_capacity(4);
        let client = Client::init(config, provider).expect("client init");

        let raw = ptr::from_ref(&client);
        unsafe { icount_ins_count(raw, thread(3), 0, false, true, false, false) };
        assert_eq!(client.store().count(Category::ConditionalBranch, 3), 1);

        let site = client.instrument(0, CategoryFlags::COND_BRANCH);
        assert!(client.try_on_execute(&thread(4), site).is_err());
        assert_eq!(client.store().total(Category::ConditionalBranch), 1);
    }

    #[test]
    fn test_null_client_is_ignored() {
        unsafe {
            icount_ins_count(ptr::null(), thread(1), 0, false, false, false, true);
            assert_eq!(icount_client_exit(ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_c_abi_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let owned: Vec<CString> = [
            "libinstr_analysis.so",
            "--output-dir",
            dir.path().to_str().expect("utf8 tempdir"),
            "--capacity",
            "64",
        ]
        .into_iter()
        .map(|a| CString::new(a).expect("no interior nul"))
        .collect();
        let arg_ptrs: Vec<*const c_char> = owned.iter().map(|a| a.as_ptr()).collect();
        let arg_count = c_int::try_from(arg_ptrs.len()).expect("argc fits");

        let mut service = FakeService::new(5);
        let table = callbacks(&mut service);
        unsafe {
            let client = icount_client_init(arg_count, arg_ptrs.as_ptr(), ptr::from_ref(&table));
            assert!(!client.is_null());

            for (handle, times) in [(1, 5), (3, 9), (4, 2)] {
                for _ in 0..times {
                    icount_ins_count(client, thread(handle), 0, false, false, false, true);
                }
            }
            icount_ins_count(client, thread(2), 1, true, false, true, false);
            assert_eq!(icount_client_exit(client), 0);
        }

        let path = dir
            .path()
            .join(format!("instr_analysis.{}.out", process::id()));
        let text = fs::read_to_string(path).expect("read report");
        assert!(text.starts_with("MEMORY LOAD : 16\n[NO. 1]Ins Call times 9\n"));
        assert!(text.contains("MEMORY STORE : 1\n[NO. 1]Ins Call times 1\n"));
        assert!(text.contains("CONDITIONAL BRANCHES : 0\nUNCONDITIONAL_BRANCHES : 1\n"));
        assert!(text.contains("ctx 3 depth 10\n"));
    }
}
