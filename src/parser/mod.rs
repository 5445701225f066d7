//! Recursive-descent parser producing the uniform AST node.
//!
//! Opaque per the purpose & scope section; implemented minimally so the
//! `franz` binary has a real front end to feed into C1-C7. Produces no
//! type information and performs no semantic analysis - every node's
//! `free_vars` starts empty and is filled in later by C1.

use crate::ast::{Node, Opcode};
use crate::error::{FranzError, ParseError};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(file: &str, tokens: Vec<Token>) -> Result<Vec<Node>, FranzError> {
    let mut parser = Parser { file, tokens, pos: 0 };
    parser.parse_program()
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn line(&self) -> usize {
        self.peek().map(|t| t.line).unwrap_or_else(|| {
            self.tokens.last().map(|t| t.line).unwrap_or(1)
        })
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, message: impl Into<String>) -> FranzError {
        FranzError::Parse(
            ParseError { message: message.into() },
            Span::new(self.file, self.line()),
        )
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, FranzError> {
        match self.advance() {
            Some(tok) if std::mem::discriminant(&tok.kind) == std::mem::discriminant(kind) => {
                Ok(tok)
            }
            Some(tok) => Err(self.error(format!("expected {kind:?} but found {:?}", tok.kind))),
            None => Err(self.error(format!("expected {kind:?} but found end of input"))),
        }
    }

    fn skip_semicolons(&mut self) {
        while matches!(self.peek(), Some(Token { kind: TokenKind::Semi, .. })) {
            self.pos += 1;
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Node>, FranzError> {
        let mut statements = Vec::new();
        self.skip_semicolons();
        while self.peek().is_some() {
            statements.push(self.parse_statement()?);
            self.skip_semicolons();
        }
        Ok(statements)
    }

    /// A statement is either `name = expr` or a bare expression.
    fn parse_statement(&mut self) -> Result<Node, FranzError> {
        if let Some(Token { kind: TokenKind::Ident(name), line }) = self.peek().cloned() {
            if matches!(
                self.tokens.get(self.pos + 1),
                Some(Token { kind: TokenKind::Equals, .. })
            ) {
                self.pos += 2; // identifier + '='
                let value = self.parse_expr()?;
                return Ok(Node::new(Opcode::Assignment, name, line)
                    .with_children(vec![value])
                    .mutable());
            }
        }
        self.parse_expr()
    }

    /// A block body is a `;`-separated run of statements, wrapped in a
    /// single `Statement` node whose last child is the yielded value.
    fn parse_block(&mut self) -> Result<Node, FranzError> {
        let line = self.line();
        let mut statements = vec![self.parse_statement()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Semi, .. })) {
            self.pos += 1;
            if matches!(self.peek(), Some(Token { kind: TokenKind::RBrace, .. })) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Node::new(Opcode::Statement, "", line).with_children(statements))
    }

    fn parse_expr(&mut self) -> Result<Node, FranzError> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Return) => {
                let line = self.line();
                self.pos += 1;
                let value = self.parse_expr()?;
                Ok(Node::new(Opcode::Return, "", line).with_children(vec![value]))
            }
            Some(TokenKind::LBrace) => self.parse_brace(),
            Some(TokenKind::LBracket) => self.parse_list(),
            Some(TokenKind::LParen) => self.parse_application(),
            Some(TokenKind::Int(v)) => {
                let line = self.line();
                self.pos += 1;
                Ok(Node::new(Opcode::Int, v.to_string(), line))
            }
            Some(TokenKind::Float(v)) => {
                let line = self.line();
                self.pos += 1;
                Ok(Node::new(Opcode::Float, v.to_string(), line))
            }
            Some(TokenKind::String(s)) => {
                let line = self.line();
                self.pos += 1;
                Ok(Node::new(Opcode::String, s, line))
            }
            Some(TokenKind::Ident(name)) => {
                let line = self.line();
                self.pos += 1;
                Ok(Node::new(Opcode::Identifier, name, line))
            }
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// `{` introduces either a function literal (`{params -> body}`) or a
    /// bare block (`{ statements }`, no arrow) used as the branch of
    /// `if`/`when`/`unless`/`cond`/the body of `loop`/`while`. Both
    /// share the same delimiter, so this speculatively collects a
    /// leading identifier run and only commits to the function-literal
    /// parse if an `->` actually follows it; otherwise it rewinds and
    /// parses the brace's contents as a plain block.
    fn parse_brace(&mut self) -> Result<Node, FranzError> {
        let line = self.line();
        self.expect(&TokenKind::LBrace)?;

        let checkpoint = self.pos;
        let mut params = Vec::new();
        while let Some(Token { kind: TokenKind::Ident(name), line }) = self.peek().cloned() {
            params.push(Node::new(Opcode::Identifier, name, line));
            self.pos += 1;
        }

        if matches!(self.peek(), Some(Token { kind: TokenKind::Arrow, .. })) {
            self.pos += 1;
            let body = if matches!(self.peek(), Some(Token { kind: TokenKind::RBrace, .. })) {
                Node::new(Opcode::Statement, "", line)
            } else {
                self.parse_block()?
            };
            self.expect(&TokenKind::RBrace)?;

            let mut children = params;
            children.push(body);
            Ok(Node::new(Opcode::Function, "", line).with_children(children))
        } else {
            self.pos = checkpoint;
            let body = if matches!(self.peek(), Some(Token { kind: TokenKind::RBrace, .. })) {
                Node::new(Opcode::Statement, "", line)
            } else {
                self.parse_block()?
            };
            self.expect(&TokenKind::RBrace)?;
            Ok(body)
        }
    }

    fn parse_list(&mut self) -> Result<Node, FranzError> {
        let line = self.line();
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        if !matches!(self.peek(), Some(Token { kind: TokenKind::RBracket, .. })) {
            elements.push(self.parse_expr()?);
            while matches!(self.peek(), Some(Token { kind: TokenKind::Comma, .. })) {
                self.pos += 1;
                elements.push(self.parse_expr()?);
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Node::new(Opcode::List, "", line).with_children(elements))
    }

    fn parse_application(&mut self) -> Result<Node, FranzError> {
        let line = self.line();
        self.expect(&TokenKind::LParen)?;
        let head = match self.advance() {
            Some(Token { kind: TokenKind::Ident(name), .. }) => name,
            Some(tok) => return Err(self.error(format!("expected identifier head, found {:?}", tok.kind))),
            None => return Err(self.error("expected identifier head, found end of input")),
        };
        let mut args = Vec::new();
        while !matches!(self.peek(), Some(Token { kind: TokenKind::RParen, .. })) {
            args.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Node::new(Opcode::Application, head, line).with_children(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> Vec<Node> {
        let tokens = lex("t.franz", source).unwrap();
        parse("t.franz", tokens).unwrap()
    }

    #[test]
    fn parses_a_plain_assignment() {
        let nodes = parse_source("x = 5");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].opcode, Opcode::Assignment);
        assert_eq!(nodes[0].value, "x");
        assert_eq!(nodes[0].children[0].opcode, Opcode::Int);
    }

    #[test]
    fn parses_a_function_literal_with_params() {
        let nodes = parse_source("f = {n -> <- n}");
        let func = &nodes[0].children[0];
        assert_eq!(func.opcode, Opcode::Function);
        assert_eq!(func.params().len(), 1);
        assert_eq!(func.params()[0].value, "n");
        assert_eq!(func.body().opcode, Opcode::Statement);
    }

    #[test]
    fn a_brace_without_an_arrow_is_a_bare_block_not_a_function_literal() {
        let nodes = parse_source("f = {n -> <- (if (is n 0) {<- 1} {<- 2})}");
        let func = &nodes[0].children[0];
        let if_application = &func.body().children[0].children[0];
        assert_eq!(if_application.value, "if");
        assert_eq!(if_application.children[1].opcode, Opcode::Statement);
        assert_eq!(if_application.children[2].opcode, Opcode::Statement);
    }

    #[test]
    fn parses_nested_applications() {
        let nodes = parse_source("(println (factorial 5))");
        assert_eq!(nodes[0].opcode, Opcode::Application);
        assert_eq!(nodes[0].value, "println");
        assert_eq!(nodes[0].children[0].opcode, Opcode::Application);
        assert_eq!(nodes[0].children[0].value, "factorial");
    }

    #[test]
    fn parses_a_list_literal() {
        let nodes = parse_source("nums = [1, 2, 3]");
        let list = &nodes[0].children[0];
        assert_eq!(list.opcode, Opcode::List);
        assert_eq!(list.child_count(), 3);
    }
}
