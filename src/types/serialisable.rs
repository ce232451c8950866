/// Types implementing WireSerialisable can be written back to a client over
/// the line protocol.
pub trait WireSerialisable {
    /// Converts the value in question to its on-the-wire response.
    fn serialise_wire(&self) -> Vec<u8>;
}
