//! Process access — the seam between wizmem and the target process.
//!
//! Everything above this module talks to the target through the
//! [`ProcessAccess`] trait, so the Windows implementation can be swapped for
//! a mock in tests.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Highest valid user-space address on x86-64 Windows.
pub const MAX_USER_ADDRESS: u64 = 0x7FFF_FFFF_0000;

/// A loaded module in the target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
    /// On-disk image path, when the provider knows it.
    pub path: Option<PathBuf>,
}

impl ModuleInfo {
    pub fn end(&self) -> u64 {
        self.base + self.size
    }
}

/// A committed, readable region of the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: u64,
    pub size: u64,
}

/// Raw access to one external target process.
///
/// The target can disappear between any two calls; implementations classify
/// failures as [`Error::MemoryRead`]/[`Error::MemoryWrite`] while the process
/// is alive and [`Error::ProcessClosed`] once it is gone. The liveness check
/// runs only after a failed call, never on the hot path.
pub trait ProcessAccess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;

    /// Allocate readable/writable/executable memory in the target.
    fn allocate(&self, size: usize) -> Result<u64>;

    fn free(&self, address: u64) -> Result<()>;

    /// Committed readable regions, in ascending base order.
    fn regions(&self) -> Result<Vec<Region>>;

    fn module(&self, name: &str) -> Result<ModuleInfo>;

    /// The main executable module.
    fn base_module(&self) -> Result<ModuleInfo>;

    fn is_running(&self) -> bool;
}

/// Reject addresses that cannot possibly be valid before touching the OS.
pub(crate) fn check_address(address: u64) -> Result<()> {
    if address == 0 || address > MAX_USER_ADDRESS {
        return Err(Error::AddressOutOfRange(address));
    }
    Ok(())
}

#[cfg(target_os = "windows")]
mod imp {
    use std::path::PathBuf;

    use tracing::debug;
    use windows::Win32::Foundation::{
        BOOL, CloseHandle, HANDLE, HWND, LPARAM, MAX_PATH, WAIT_TIMEOUT,
    };
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE,
        PAGE_GUARD, PAGE_NOACCESS, VirtualAllocEx, VirtualFreeEx, VirtualQueryEx,
    };
    use windows::Win32::System::ProcessStatus::{
        EnumProcessModulesEx, GetModuleBaseNameW, GetModuleFileNameExW, GetModuleInformation,
        LIST_MODULES_64BIT, MODULEINFO,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_ALL_ACCESS, WaitForSingleObject,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
    };

    use super::{MAX_USER_ADDRESS, ModuleInfo, ProcessAccess, Region, check_address};
    use crate::error::{Error, Result};

    /// An open handle to the target process.
    pub struct ProcessHandle {
        handle: HANDLE,
        pid: u32,
    }

    // HANDLE is a plain kernel object id; the Win32 calls used here are
    // thread-safe on a shared handle.
    unsafe impl Send for ProcessHandle {}
    unsafe impl Sync for ProcessHandle {}

    struct WindowSearch {
        title: Vec<u16>,
        pid: Option<u32>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let search = unsafe { &mut *(lparam.0 as *mut WindowSearch) };

        if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
            return BOOL(1);
        }

        let mut text = [0u16; 256];
        let len = unsafe { GetWindowTextW(hwnd, &mut text) } as usize;
        if text[..len] != search.title[..] {
            return BOOL(1);
        }

        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        if pid != 0 {
            search.pid = Some(pid);
            return BOOL(0); // Stop enumeration
        }
        BOOL(1)
    }

    impl ProcessHandle {
        /// Open the process that owns the visible window with the given title.
        pub fn from_window_title(title: &str) -> Result<Self> {
            let mut search = WindowSearch {
                title: title.encode_utf16().collect(),
                pid: None,
            };

            // SAFETY: the callback only dereferences the WindowSearch pointer
            // passed through LPARAM, which outlives the call.
            unsafe {
                let _ = EnumWindows(
                    Some(enum_callback),
                    LPARAM(&mut search as *mut WindowSearch as isize),
                );
            }

            let pid = search
                .pid
                .ok_or_else(|| Error::ProcessNotFound(title.to_string()))?;

            Self::from_pid(pid)
        }

        pub fn from_pid(pid: u32) -> Result<Self> {
            // SAFETY: OpenProcess returns an owned handle or an error.
            let handle = unsafe { OpenProcess(PROCESS_ALL_ACCESS, false, pid) }
                .map_err(|e| Error::ProcessOpenFailed(format!("pid {pid}: {e}")))?;

            debug!(pid, "opened target process");
            Ok(Self { handle, pid })
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }

        /// Classify a failed read/write: only now do we pay for a liveness
        /// check, so the hot path stays a single syscall.
        fn classify_failure(&self, fallback: Error) -> Error {
            if self.is_running() { fallback } else { Error::ProcessClosed }
        }

        fn modules(&self) -> Result<Vec<ModuleInfo>> {
            let mut handles = [windows::Win32::Foundation::HMODULE::default(); 1024];
            let mut needed = 0u32;

            // SAFETY: EnumProcessModulesEx fills the handle array up to its size.
            unsafe {
                EnumProcessModulesEx(
                    self.handle,
                    handles.as_mut_ptr(),
                    size_of_val(&handles) as u32,
                    &mut needed,
                    LIST_MODULES_64BIT,
                )
            }
            .map_err(|e| Error::ProcessOpenFailed(format!("module enumeration: {e}")))?;

            let count = (needed as usize / size_of::<windows::Win32::Foundation::HMODULE>())
                .min(handles.len());

            let mut modules = Vec::with_capacity(count);
            for &hmod in &handles[..count] {
                let mut name = [0u16; MAX_PATH as usize];
                let mut path = [0u16; MAX_PATH as usize];
                let mut info = MODULEINFO::default();

                // SAFETY: all three calls write into caller-owned buffers for
                // a module handle we just enumerated.
                let (name_len, path_len, info_ok) = unsafe {
                    (
                        GetModuleBaseNameW(self.handle, Some(hmod), &mut name) as usize,
                        GetModuleFileNameExW(self.handle, Some(hmod), &mut path) as usize,
                        GetModuleInformation(
                            self.handle,
                            hmod,
                            &mut info,
                            size_of::<MODULEINFO>() as u32,
                        )
                        .is_ok(),
                    )
                };

                if name_len == 0 || !info_ok {
                    continue;
                }

                modules.push(ModuleInfo {
                    name: String::from_utf16_lossy(&name[..name_len]),
                    base: info.lpBaseOfDll as u64,
                    size: info.SizeOfImage as u64,
                    path: (path_len > 0)
                        .then(|| PathBuf::from(String::from_utf16_lossy(&path[..path_len]))),
                });
            }

            Ok(modules)
        }
    }

    impl ProcessAccess for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            check_address(address)?;

            let mut buffer = vec![0u8; size];
            let mut read = 0usize;

            // SAFETY: the buffer is owned and at least `size` bytes long.
            let res = unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const _,
                    buffer.as_mut_ptr().cast(),
                    size,
                    Some(&mut read),
                )
            };

            if res.is_err() || read != size {
                return Err(self.classify_failure(Error::MemoryRead { address, size }));
            }
            Ok(buffer)
        }

        fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
            check_address(address)?;

            let mut written = 0usize;
            // SAFETY: the source slice is valid for its full length.
            let res = unsafe {
                WriteProcessMemory(
                    self.handle,
                    address as *const _,
                    bytes.as_ptr().cast(),
                    bytes.len(),
                    Some(&mut written),
                )
            };

            if res.is_err() || written != bytes.len() {
                return Err(self.classify_failure(Error::MemoryWrite {
                    address,
                    size: bytes.len(),
                }));
            }
            Ok(())
        }

        fn allocate(&self, size: usize) -> Result<u64> {
            // SAFETY: a null base lets the kernel pick the address.
            let addr = unsafe {
                VirtualAllocEx(
                    self.handle,
                    None,
                    size,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_EXECUTE_READWRITE,
                )
            };

            if addr.is_null() {
                return Err(Error::AllocationFailed(size));
            }
            Ok(addr as u64)
        }

        fn free(&self, address: u64) -> Result<()> {
            check_address(address)?;
            // SAFETY: MEM_RELEASE with size 0 frees the whole allocation.
            unsafe { VirtualFreeEx(self.handle, address as *mut _, 0, MEM_RELEASE) }
                .map_err(|_| Error::MemoryWrite { address, size: 0 })
        }

        fn regions(&self) -> Result<Vec<Region>> {
            let mut regions = Vec::new();
            let mut address = 0u64;

            while address < MAX_USER_ADDRESS {
                let mut mbi = MEMORY_BASIC_INFORMATION::default();
                // SAFETY: VirtualQueryEx fills the caller-owned struct.
                let len = unsafe {
                    VirtualQueryEx(
                        self.handle,
                        Some(address as *const _),
                        &mut mbi,
                        size_of::<MEMORY_BASIC_INFORMATION>(),
                    )
                };
                if len == 0 {
                    break;
                }

                let protect = mbi.Protect.0;
                if mbi.State == MEM_COMMIT
                    && protect & PAGE_GUARD.0 == 0
                    && protect & PAGE_NOACCESS.0 == 0
                {
                    regions.push(Region {
                        base: mbi.BaseAddress as u64,
                        size: mbi.RegionSize as u64,
                    });
                }

                address = mbi.BaseAddress as u64 + mbi.RegionSize as u64;
            }

            Ok(regions)
        }

        fn module(&self, name: &str) -> Result<ModuleInfo> {
            self.modules()?
                .into_iter()
                .find(|m| m.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
        }

        fn base_module(&self) -> Result<ModuleInfo> {
            // The first enumerated module is the executable image.
            self.modules()?
                .into_iter()
                .next()
                .ok_or_else(|| Error::ModuleNotFound("<main module>".to_string()))
        }

        fn is_running(&self) -> bool {
            // SAFETY: a zero timeout makes this a non-blocking poll.
            unsafe { WaitForSingleObject(self.handle, 0) == WAIT_TIMEOUT }
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            // SAFETY: the handle was opened by us and is closed exactly once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use imp::ProcessHandle;

#[cfg(not(target_os = "windows"))]
mod imp {
    use super::{ModuleInfo, ProcessAccess, Region};
    use crate::error::{Error, Result};

    /// Stub for non-Windows builds; every operation fails.
    pub struct ProcessHandle;

    impl ProcessHandle {
        pub fn from_window_title(_title: &str) -> Result<Self> {
            Err(Error::ProcessOpenFailed(
                "process access is only supported on Windows".to_string(),
            ))
        }

        pub fn from_pid(_pid: u32) -> Result<Self> {
            Err(Error::ProcessOpenFailed(
                "process access is only supported on Windows".to_string(),
            ))
        }
    }

    impl ProcessAccess for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            Err(Error::MemoryRead { address, size })
        }

        fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
            Err(Error::MemoryWrite {
                address,
                size: bytes.len(),
            })
        }

        fn allocate(&self, size: usize) -> Result<u64> {
            Err(Error::AllocationFailed(size))
        }

        fn free(&self, _address: u64) -> Result<()> {
            Ok(())
        }

        fn regions(&self) -> Result<Vec<Region>> {
            Ok(Vec::new())
        }

        fn module(&self, name: &str) -> Result<ModuleInfo> {
            Err(Error::ModuleNotFound(name.to_string()))
        }

        fn base_module(&self) -> Result<ModuleInfo> {
            Err(Error::ModuleNotFound("<main module>".to_string()))
        }

        fn is_running(&self) -> bool {
            false
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use imp::ProcessHandle;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_shape_check() {
        assert!(matches!(
            check_address(0),
            Err(Error::AddressOutOfRange(0))
        ));
        assert!(matches!(
            check_address(MAX_USER_ADDRESS + 1),
            Err(Error::AddressOutOfRange(_))
        ));
        assert!(check_address(0x1000).is_ok());
        assert!(check_address(MAX_USER_ADDRESS).is_ok());
    }

    #[test]
    fn module_end() {
        let m = ModuleInfo {
            name: "a.dll".to_string(),
            base: 0x1000,
            size: 0x2000,
            path: None,
        };
        assert_eq!(m.end(), 0x3000);
    }
}
