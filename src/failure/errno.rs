//! Platform error codes to failures.
//!
//! Sockets report the same condition with different numbers on different
//! systems (`ECONNREFUSED` is 111 on Linux, 61 on macOS, `WSAECONNREFUSED`
//! is 10061 on Windows). Each table below lists the codes of one platform
//! family. Classification dispatches on the raw code first and on
//! [`std::io::ErrorKind`] second, so the resulting failure is identical
//! everywhere.

use super::codes::*;

#[cfg(unix)]
static ERRNO_TABLE: &[(i32, &str)] = &[
    (libc::EADDRINUSE, ADDRESS_IN_USE),
    (libc::EADDRNOTAVAIL, ADDRESS_NOT_AVAILABLE),
    (libc::EAFNOSUPPORT, ADDRESS_FAMILY_NOT_SUPPORTED),
    (libc::EALREADY, CONNECTION_ALREADY_IN_PROGRESS),
    (libc::EBADF, BAD_FILE_DESCRIPTOR),
    (libc::ECONNABORTED, CONNECTION_ABORTED),
    (libc::ECONNREFUSED, CONNECTION_REFUSED),
    (libc::ECONNRESET, CONNECTION_RESET),
    (libc::EDESTADDRREQ, DESTINATION_ADDRESS_REQUIRED),
    (libc::EFAULT, BAD_ADDRESS),
    (libc::EHOSTUNREACH, HOST_UNREACHABLE),
    (libc::EINTR, INTERRUPTED),
    (libc::EINVAL, INVALID_ARGUMENT),
    (libc::EISCONN, ALREADY_CONNECTED),
    (libc::EMSGSIZE, MESSAGE_SIZE),
    (libc::ENETDOWN, NETWORK_DOWN),
    (libc::ENETRESET, NETWORK_RESET),
    (libc::ENETUNREACH, NETWORK_UNREACHABLE),
    (libc::ENOBUFS, NO_BUFFER_SPACE),
    (libc::ENOPROTOOPT, NO_PROTOCOL_OPTION),
    (libc::ENOTCONN, NOT_CONNECTED),
    (libc::ENOTSOCK, NOT_A_SOCKET),
    (libc::EPROTONOSUPPORT, PROTOCOL_NOT_SUPPORTED),
    (libc::EPROTOTYPE, WRONG_PROTOCOL_TYPE),
    (libc::EACCES, PERMISSION_DENIED),
    (libc::EPERM, PERMISSION_DENIED),
    (libc::ETIMEDOUT, TIMED_OUT),
    (libc::EAGAIN, OPERATION_WOULD_BLOCK),
    (libc::EWOULDBLOCK, OPERATION_WOULD_BLOCK),
];

// Winsock codes from winerror.h.
#[cfg(windows)]
static ERRNO_TABLE: &[(i32, &str)] = &[
    (10004, INTERRUPTED),                    // WSAEINTR
    (10009, BAD_FILE_DESCRIPTOR),            // WSAEBADF
    (10013, PERMISSION_DENIED),              // WSAEACCES
    (10014, BAD_ADDRESS),                    // WSAEFAULT
    (10022, INVALID_ARGUMENT),               // WSAEINVAL
    (10035, OPERATION_WOULD_BLOCK),          // WSAEWOULDBLOCK
    (10037, CONNECTION_ALREADY_IN_PROGRESS), // WSAEALREADY
    (10038, NOT_A_SOCKET),                   // WSAENOTSOCK
    (10039, DESTINATION_ADDRESS_REQUIRED),   // WSAEDESTADDRREQ
    (10040, MESSAGE_SIZE),                   // WSAEMSGSIZE
    (10041, WRONG_PROTOCOL_TYPE),            // WSAEPROTOTYPE
    (10042, NO_PROTOCOL_OPTION),             // WSAENOPROTOOPT
    (10043, PROTOCOL_NOT_SUPPORTED),         // WSAEPROTONOSUPPORT
    (10047, ADDRESS_FAMILY_NOT_SUPPORTED),   // WSAEAFNOSUPPORT
    (10048, ADDRESS_IN_USE),                 // WSAEADDRINUSE
    (10049, ADDRESS_NOT_AVAILABLE),          // WSAEADDRNOTAVAIL
    (10050, NETWORK_DOWN),                   // WSAENETDOWN
    (10051, NETWORK_UNREACHABLE),            // WSAENETUNREACH
    (10052, NETWORK_RESET),                  // WSAENETRESET
    (10053, CONNECTION_ABORTED),             // WSAECONNABORTED
    (10054, CONNECTION_RESET),               // WSAECONNRESET
    (10055, NO_BUFFER_SPACE),                // WSAENOBUFS
    (10056, ALREADY_CONNECTED),              // WSAEISCONN
    (10057, NOT_CONNECTED),                  // WSAENOTCONN
    (10060, TIMED_OUT),                      // WSAETIMEDOUT
    (10061, CONNECTION_REFUSED),             // WSAECONNREFUSED
    (10065, HOST_UNREACHABLE),               // WSAEHOSTUNREACH
];

#[cfg(not(any(unix, windows)))]
static ERRNO_TABLE: &[(i32, &str)] = &[];

/// Failure for a raw OS error code, if the code is in this platform's table.
pub fn errno_failure(code: i32) -> Option<&'static str> {
    ERRNO_TABLE
        .iter()
        .find(|(errno, _)| *errno == code)
        .map(|(_, failure)| *failure)
}
