//! The failure vocabulary.
//!
//! These strings are persisted in measurement results and consumed by
//! analysis pipelines, so they never change once published.

/// Prefix of the catch-all failure, followed by the scrubbed raw message.
pub const UNKNOWN_FAILURE_PREFIX: &str = "unknown_failure: ";

// Cancellation and timeouts
pub const CONTEXT_CANCELED: &str = "context_canceled";
pub const GENERIC_TIMEOUT_ERROR: &str = "generic_timeout_error";
pub const TIMED_OUT: &str = "timed_out";
pub const INTERRUPTED: &str = "interrupted";

// Connection-level failures (errno derived)
pub const ADDRESS_FAMILY_NOT_SUPPORTED: &str = "address_family_not_supported";
pub const ADDRESS_IN_USE: &str = "address_in_use";
pub const ADDRESS_NOT_AVAILABLE: &str = "address_not_available";
pub const ALREADY_CONNECTED: &str = "already_connected";
pub const BAD_ADDRESS: &str = "bad_address";
pub const BAD_FILE_DESCRIPTOR: &str = "bad_file_descriptor";
pub const CONNECTION_ABORTED: &str = "connection_aborted";
pub const CONNECTION_ALREADY_CLOSED: &str = "connection_already_closed";
pub const CONNECTION_ALREADY_IN_PROGRESS: &str = "connection_already_in_progress";
pub const CONNECTION_REFUSED: &str = "connection_refused";
pub const CONNECTION_RESET: &str = "connection_reset";
pub const DESTINATION_ADDRESS_REQUIRED: &str = "destination_address_required";
pub const EOF_ERROR: &str = "eof_error";
pub const HOST_UNREACHABLE: &str = "host_unreachable";
pub const INVALID_ARGUMENT: &str = "invalid_argument";
pub const MESSAGE_SIZE: &str = "message_size";
pub const NETWORK_DOWN: &str = "network_down";
pub const NETWORK_RESET: &str = "network_reset";
pub const NETWORK_UNREACHABLE: &str = "network_unreachable";
pub const NO_BUFFER_SPACE: &str = "no_buffer_space";
pub const NO_PROTOCOL_OPTION: &str = "no_protocol_option";
pub const NOT_A_SOCKET: &str = "not_a_socket";
pub const NOT_CONNECTED: &str = "not_connected";
pub const OPERATION_WOULD_BLOCK: &str = "operation_would_block";
pub const PERMISSION_DENIED: &str = "permission_denied";
pub const PROTOCOL_NOT_SUPPORTED: &str = "protocol_not_supported";
pub const WRONG_PROTOCOL_TYPE: &str = "wrong_protocol_type";

// DNS
pub const ANDROID_DNS_CACHE_NO_DATA: &str = "android_dns_cache_no_data";
pub const DNS_BOGON_ERROR: &str = "dns_bogon_error";
pub const DNS_NO_ANSWER: &str = "dns_no_answer";
pub const DNS_NON_RECOVERABLE_FAILURE: &str = "dns_non_recoverable_failure";
pub const DNS_NXDOMAIN_ERROR: &str = "dns_nxdomain_error";
pub const DNS_REFUSED_ERROR: &str = "dns_refused_error";
pub const DNS_SERVER_MISBEHAVING: &str = "dns_server_misbehaving";
pub const DNS_TEMPORARY_FAILURE: &str = "dns_temporary_failure";

// TLS and QUIC
pub const SSL_FAILED_HANDSHAKE: &str = "ssl_failed_handshake";
pub const SSL_INVALID_CERTIFICATE: &str = "ssl_invalid_certificate";
pub const SSL_INVALID_HOSTNAME: &str = "ssl_invalid_hostname";
pub const SSL_UNKNOWN_AUTHORITY: &str = "ssl_unknown_authority";
pub const QUIC_INCOMPATIBLE_VERSION: &str = "quic_incompatible_version";
