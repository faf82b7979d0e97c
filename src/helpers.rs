use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Converts raw `httparse` output into a multi-valued [`HeaderMap`].
/// Repeated names keep every value in order. Entries the `http` crate
/// rejects are skipped; header quality is the caller's concern.
pub(crate) fn raw_headers_to_map(raw: &[httparse::Header<'_>]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(raw.len());

    for header in raw {
        let name = match HeaderName::from_bytes(header.name.as_bytes()) {
            Ok(name) => name,
            Err(_err) => {
                #[cfg(feature = "log")]
                log::debug!("skipping header with unusable name {:?}: {}", header.name, _err);
                continue;
            }
        };
        let value = match HeaderValue::from_bytes(header.value) {
            Ok(value) => value,
            Err(_err) => {
                #[cfg(feature = "log")]
                log::debug!("skipping header '{}' with unusable value: {}", name, _err);
                continue;
            }
        };
        headers.append(name, value);
    }

    headers
}
