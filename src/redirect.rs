//! Redirect following: re-dispatches on 301/302 until a final response or the limit.

use crate::{
    dispatch::{self, Context, Exchange},
    uri, Error, Method, Outcome, Request, Termination,
};
use log::{debug, warn};

/// Where one logical request currently stands.
enum State {
    /// A hop is about to be sent for the request's current URL.
    Dispatching(Request),
    /// A 301/302 arrived; the next URL is derived from the hop that received it.
    Redirecting {
        request: Request,
        context: Context,
        location: String,
    },
    /// The operation is over.
    Done(Result<Outcome, Error>),
}

/// Run `request` to completion, following up to its redirect limit.
pub(crate) async fn follow(request: Request) -> Result<Outcome, Error> {
    // read once: later hops never re-derive the limit
    let max = request.max_redirects;
    let mut hops = 0usize;
    let mut state = State::Dispatching(request);

    loop {
        state = match state {
            State::Dispatching(mut request) => match dispatch::send(&mut request).await {
                Err(e) => State::Done(Err(e)),
                Ok((context, exchange)) => decide(request, context, exchange, &mut hops, max),
            },
            State::Redirecting {
                mut request,
                context,
                location,
            } => {
                let next = uri::resolve(&context.target, &location);
                debug!("redirect {hops}/{max}: {} -> {next}", context.target);
                request.url = next;
                State::Dispatching(request)
            }
            State::Done(result) => return result,
        };
    }
}

/// Pick the state that follows a completed hop.
fn decide(request: Request, context: Context, exchange: Exchange, hops: &mut usize, max: usize) -> State {
    let Exchange { response, content } = exchange;

    if context.method == Method::HEAD {
        return State::Done(Ok(Outcome {
            response,
            content: None,
            redirects: *hops,
            url: request.url,
            termination: Termination::Head,
        }));
    }

    if response.is_redirect() {
        *hops += 1;
        if *hops > max {
            warn!("giving up on {} after {max} redirects", request.url);
            return State::Done(Err(Error::RedirectLimitExceeded { max }));
        }
        return match response.header("location") {
            Some(location) => State::Redirecting {
                location: location.to_string(),
                request,
                context,
            },
            None => State::Done(Err(Error::InvalidResponse("redirect without location header"))),
        };
    }

    State::Done(Ok(Outcome {
        response,
        content,
        redirects: *hops,
        url: request.url,
        termination: Termination::Complete,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{response::Response, uri::Target, Content};
    use std::collections::HashMap;

    fn hop(method: Method, url: &str, status: u16, location: Option<&str>) -> (Request, Context, Exchange) {
        let request = Request::new(url, method);
        let context = Context {
            target: Target::parse(url).unwrap(),
            method,
            headers: HashMap::new(),
        };
        let headers = location
            .map(|l| HashMap::from([("location".to_string(), l.to_string())]))
            .unwrap_or_default();
        let exchange = Exchange {
            response: Response {
                version: "HTTP/1.1".into(),
                status,
                reason: String::new(),
                headers,
            },
            content: (method != Method::HEAD).then(|| Content::Text("body".into())),
        };
        (request, context, exchange)
    }

    #[test]
    fn head_is_final_even_on_redirect() {
        let (request, context, exchange) = hop(Method::HEAD, "http://a.example/", 302, Some("/b"));
        let mut hops = 0;
        let State::Done(Ok(outcome)) = decide(request, context, exchange, &mut hops, 10) else {
            panic!("HEAD must finish");
        };
        assert_eq!(outcome.termination, Termination::Head);
        assert_eq!(outcome.content, None);
        assert_eq!(outcome.response.status, 302);
        assert_eq!(hops, 0);
    }

    #[test]
    fn redirect_counts_hops() {
        let (request, context, exchange) = hop(Method::GET, "https://a.example/x", 301, Some("/next"));
        let mut hops = 2;
        let State::Redirecting { location, context, .. } = decide(request, context, exchange, &mut hops, 3) else {
            panic!("expected a redirect");
        };
        assert_eq!(hops, 3);
        assert_eq!(uri::resolve(&context.target, &location), "https://a.example/next");
    }

    #[test]
    fn limit_exceeded() {
        let (request, context, exchange) = hop(Method::GET, "http://a.example/", 302, Some("/again"));
        let mut hops = 3;
        let state = decide(request, context, exchange, &mut hops, 3);
        assert!(matches!(state, State::Done(Err(Error::RedirectLimitExceeded { max: 3 }))));
    }

    #[test]
    fn redirect_without_location() {
        let (request, context, exchange) = hop(Method::POST, "http://a.example/", 301, None);
        let state = decide(request, context, exchange, &mut 0, 10);
        assert!(matches!(state, State::Done(Err(Error::InvalidResponse(_)))));
    }

    #[test]
    fn other_statuses_are_final() {
        for status in [200, 303, 307, 404, 500] {
            let (request, context, exchange) = hop(Method::GET, "http://a.example/", status, Some("/b"));
            let State::Done(Ok(outcome)) = decide(request, context, exchange, &mut 1, 10) else {
                panic!("{status} must finish");
            };
            assert_eq!(outcome.response.status, status);
            assert_eq!(outcome.redirects, 1);
            assert_eq!(outcome.termination, Termination::Complete);
            assert_eq!(outcome.text(), Some("body"));
        }
    }
}
