use crate::constants;

/// Demultiplexer configuration.
///
/// # Examples
///
/// ```
/// use multisect::Config;
///
/// let config = Config::new().boundary("X-BOUNDARY").part_buffer_size(8 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) boundary: Option<String>,
    pub(crate) header_first: bool,
    pub(crate) part_buffer_size: usize,
}

impl Config {
    /// Creates the default configuration: no boundary, header-first mode
    /// off, a 16 KiB part buffer hint.
    pub fn new() -> Config {
        Config {
            boundary: None,
            header_first: false,
            part_buffer_size: constants::DEFAULT_PART_BUFFER_SIZE,
        }
    }

    /// The delimiter token, without the leading dashes.
    pub fn boundary<B>(mut self, boundary: B) -> Config
    where
        B: Into<String>,
    {
        self.boundary = Some(boundary.into());
        self
    }

    /// Treats the bytes before the first boundary as a header block
    /// belonging to the preamble. This also allows starting without a
    /// boundary: parse the preamble headers, then install the boundary they
    /// advertise via [`set_boundary`](crate::Events::set_boundary).
    pub fn header_first(mut self, header_first: bool) -> Config {
        self.header_first = header_first;
        self
    }

    /// Soft cap on bytes buffered per part before `consume` withholds its
    /// acknowledgement. A hint, not a limit: a span crossing the cap is
    /// still delivered whole.
    pub fn part_buffer_size(mut self, size: usize) -> Config {
        self.part_buffer_size = size;
        self
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
