/// Derives the rate-limit subject from a request.
///
/// The key identifies the calling identity, typically a client network
/// address. Closures of the shape `Fn(&Req) -> String` implement this
/// directly:
///
/// ```rust
/// use tower_surge::KeyExtractor;
///
/// let by_value = |req: &String| req.clone();
/// assert_eq!(by_value.key(&"192.168.1.6:8080".to_string()), "192.168.1.6:8080");
/// ```
pub trait KeyExtractor<Req>: Send + Sync {
    fn key(&self, req: &Req) -> String;
}

impl<F, Req> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> String + Send + Sync,
{
    fn key(&self, req: &Req) -> String {
        self(req)
    }
}
